// marketplace/src/store/memory.rs

//! In-process `MarketStore`. All collections sit behind one mutex, so every
//! method is trivially atomic. Used when no database is configured and by
//! the test-suite.

use super::rules::{plan_assignment_removal, plan_assignment_update, plan_cancellation, plan_new_assignment};
use super::{MarketStore, StoreError, StoreResult, AGENT_SEQUENCE, ORDER_SEQUENCE};
use crate::models::delivery_agent::agent_id_from_sequence;
use crate::models::order::order_id_from_sequence;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Collections {
  sequences: HashMap<String, i64>,
  users: HashMap<Uuid, User>,
  products: HashMap<Uuid, Product>,
  carts: HashMap<Uuid, Cart>,
  orders: HashMap<String, Order>,
  agents: HashMap<String, DeliveryAgent>,
  assignments: HashMap<String, OrderAssignment>,
  cart_orders: HashMap<String, CartOrder>,
  subscriptions: HashMap<String, FoodSubscription>,
  subscription_logs: Vec<FoodSubscriptionLog>,
}

impl Collections {
  fn bump(&mut self, name: &str) -> i64 {
    let value = self.sequences.entry(name.to_string()).or_insert(0);
    *value += 1;
    *value
  }

  fn user_mut(&mut self, id: Uuid) -> StoreResult<&mut User> {
    self.users.get_mut(&id).ok_or_else(|| StoreError::not_found("user", id))
  }

  fn product_mut(&mut self, id: Uuid) -> StoreResult<&mut Product> {
    self.products.get_mut(&id).ok_or_else(|| StoreError::not_found("product", id))
  }

  fn order_mut(&mut self, order_id: &str) -> StoreResult<&mut Order> {
    self.orders.get_mut(order_id).ok_or_else(|| StoreError::not_found("order", order_id))
  }

  fn order(&self, order_id: &str) -> StoreResult<Order> {
    self.orders.get(order_id).cloned().ok_or_else(|| StoreError::not_found("order", order_id))
  }

  fn agent(&self, agent_id: &str) -> StoreResult<DeliveryAgent> {
    self.agents.get(agent_id).cloned().ok_or_else(|| StoreError::not_found("delivery agent", agent_id))
  }

  fn cart_mut(&mut self, user_id: Uuid) -> &mut Cart {
    self.carts.entry(user_id).or_insert_with(|| Cart::empty(user_id))
  }

  fn store_agents(&mut self, agents: Vec<DeliveryAgent>) {
    for agent in agents {
      self.agents.insert(agent.agent_id.clone(), agent);
    }
  }
}

fn newest_first<T, F>(mut items: Vec<T>, created: F) -> Vec<T>
where
  F: Fn(&T) -> DateTime<Utc>,
{
  items.sort_by(|a, b| created(b).cmp(&created(a)));
  items
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Collections>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl MarketStore for MemoryStore {
  async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
    Ok(self.inner.lock().bump(name))
  }

  async fn create_user(&self, user: NewUser) -> StoreResult<User> {
    let mut db = self.inner.lock();
    if db.users.values().any(|u| u.email == user.email) {
      return Err(StoreError::Conflict(format!("An account with email {} already exists", user.email)));
    }
    let now = Utc::now();
    let record = User {
      id: Uuid::new_v4(),
      name: user.name,
      email: user.email,
      password_hash: user.password_hash,
      user_type: user.user_type,
      is_blocked: false,
      phone: user.phone,
      address: user.address,
      farm_name: user.farm_name,
      farm_location: user.farm_location,
      subscription_paid: false,
      farmer_status: user.farmer_status,
      created_at: now,
      updated_at: now,
    };
    db.users.insert(record.id, record.clone());
    Ok(record)
  }

  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
    Ok(self.inner.lock().users.get(&id).cloned())
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    Ok(self.inner.lock().users.values().find(|u| u.email == email).cloned())
  }

  async fn list_users(&self, user_type: Option<UserType>) -> StoreResult<Vec<User>> {
    let db = self.inner.lock();
    let users = db
      .users
      .values()
      .filter(|u| user_type.map_or(true, |t| u.user_type == t))
      .cloned()
      .collect();
    Ok(newest_first(users, |u: &User| u.created_at))
  }

  async fn list_farmers_by_status(&self, status: FarmerStatus) -> StoreResult<Vec<User>> {
    let db = self.inner.lock();
    let users = db
      .users
      .values()
      .filter(|u| u.user_type == UserType::Farmer && u.farmer_status == Some(status))
      .cloned()
      .collect();
    Ok(newest_first(users, |u: &User| u.created_at))
  }

  async fn update_user_profile(&self, id: Uuid, update: UserProfileUpdate) -> StoreResult<User> {
    let mut db = self.inner.lock();
    let user = db.user_mut(id)?;
    if let Some(name) = update.name {
      user.name = name;
    }
    if update.phone.is_some() {
      user.phone = update.phone;
    }
    if update.address.is_some() {
      user.address = update.address;
    }
    if update.farm_name.is_some() {
      user.farm_name = update.farm_name;
    }
    if update.farm_location.is_some() {
      user.farm_location = update.farm_location;
    }
    user.updated_at = Utc::now();
    Ok(user.clone())
  }

  async fn set_farmer_status(&self, id: Uuid, status: FarmerStatus, subscription_paid: Option<bool>) -> StoreResult<User> {
    let mut db = self.inner.lock();
    let user = db.user_mut(id)?;
    user.farmer_status = Some(status);
    if let Some(paid) = subscription_paid {
      user.subscription_paid = paid;
    }
    user.updated_at = Utc::now();
    Ok(user.clone())
  }

  async fn set_user_blocked(&self, id: Uuid, blocked: bool) -> StoreResult<User> {
    let mut db = self.inner.lock();
    let user = db.user_mut(id)?;
    user.is_blocked = blocked;
    user.updated_at = Utc::now();
    Ok(user.clone())
  }

  async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
    let now = Utc::now();
    let record = Product {
      product_id: Uuid::new_v4(),
      product_name: product.product_name,
      description: product.description,
      price_cents: product.price_cents,
      last_price_cents: None,
      quantity_in_stock: product.quantity_in_stock,
      expiry_date: product.expiry_date,
      images: product.images,
      owner: product.owner,
      created_at: now,
      updated_at: now,
    };
    self.inner.lock().products.insert(record.product_id, record.clone());
    Ok(record)
  }

  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
    Ok(self.inner.lock().products.get(&id).cloned())
  }

  async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>> {
    let db = self.inner.lock();
    let products = db.products.values().filter(|p| filter.matches(p)).cloned().collect();
    Ok(newest_first(products, |p: &Product| p.created_at))
  }

  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product> {
    let mut db = self.inner.lock();
    let product = db.product_mut(id)?;
    if let Some(name) = update.product_name {
      product.product_name = name;
    }
    if update.description.is_some() {
      product.description = update.description;
    }
    if let Some(price) = update.price_cents {
      if price != product.price_cents {
        product.last_price_cents = Some(product.price_cents);
        product.price_cents = price;
      }
    }
    if let Some(stock) = update.quantity_in_stock {
      product.quantity_in_stock = stock;
    }
    if let Some(expiry) = update.expiry_date {
      product.expiry_date = expiry;
    }
    if let Some(images) = update.images {
      product.images = images;
    }
    product.updated_at = Utc::now();
    Ok(product.clone())
  }

  async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
    match self.inner.lock().products.remove(&id) {
      Some(_) => Ok(()),
      None => Err(StoreError::not_found("product", id)),
    }
  }

  async fn reserve_stock(&self, id: Uuid, quantity: i32) -> StoreResult<Product> {
    let mut db = self.inner.lock();
    let product = db.product_mut(id)?;
    if product.quantity_in_stock < quantity {
      return Err(StoreError::InsufficientStock {
        product_id: id,
        available: product.quantity_in_stock,
        requested: quantity,
      });
    }
    product.quantity_in_stock -= quantity;
    product.updated_at = Utc::now();
    Ok(product.clone())
  }

  async fn restore_stock(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
    let mut db = self.inner.lock();
    let product = db.product_mut(id)?;
    product.quantity_in_stock += quantity;
    product.updated_at = Utc::now();
    Ok(())
  }

  async fn delete_expired_products(&self, now: DateTime<Utc>) -> StoreResult<Vec<Product>> {
    let mut db = self.inner.lock();
    let expired: Vec<Uuid> = db.products.values().filter(|p| p.is_expired(now)).map(|p| p.product_id).collect();
    let removed = expired.iter().filter_map(|id| db.products.remove(id)).collect();
    Ok(removed)
  }

  async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart> {
    Ok(self.inner.lock().carts.get(&user_id).cloned().unwrap_or_else(|| Cart::empty(user_id)))
  }

  async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32, max_quantity: i32) -> StoreResult<Cart> {
    let mut db = self.inner.lock();
    let cart = db.cart_mut(user_id);
    cart
      .merge_line(product_id, quantity, max_quantity, Utc::now())
      .map_err(|in_cart| {
        StoreError::Rejected(format!(
          "Only {} in stock; {} already in cart, {} requested",
          max_quantity, in_cart, quantity
        ))
      })?;
    Ok(cart.clone())
  }

  async fn set_cart_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> StoreResult<Cart> {
    let mut db = self.inner.lock();
    let cart = db.cart_mut(user_id);
    let idx = cart
      .items
      .iter()
      .position(|l| l.product_id == product_id)
      .ok_or_else(|| StoreError::not_found("cart item", product_id))?;
    if quantity == 0 {
      cart.items.remove(idx);
    } else {
      cart.items[idx].quantity = quantity;
    }
    cart.updated_at = Utc::now();
    Ok(cart.clone())
  }

  async fn remove_cart_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Cart> {
    self.set_cart_quantity(user_id, product_id, 0).await
  }

  async fn replace_cart_items(&self, user_id: Uuid, items: Vec<CartLine>) -> StoreResult<Cart> {
    let mut db = self.inner.lock();
    let cart = db.cart_mut(user_id);
    cart.items = items;
    cart.updated_at = Utc::now();
    Ok(cart.clone())
  }

  async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
    let mut db = self.inner.lock();
    let cart = db.cart_mut(user_id);
    cart.items.clear();
    cart.updated_at = Utc::now();
    Ok(())
  }

  async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
    let mut db = self.inner.lock();
    let order_id = order_id_from_sequence(db.bump(ORDER_SEQUENCE));
    let now = Utc::now();
    let record = Order {
      order_id: order_id.clone(),
      user_id: order.user_id,
      email: order.email,
      name: order.delivery.name,
      address: order.delivery.address,
      phone: order.delivery.phone,
      ordered_items: order.ordered_items,
      total_cents: order.total_cents,
      status: OrderStatus::Processing,
      notes: order.delivery.notes,
      delivery_agent_id: None,
      assigned_agent: None,
      assigned_at: None,
      created_at: now,
      updated_at: now,
    };
    db.orders.insert(order_id, record.clone());
    Ok(record)
  }

  async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
    Ok(self.inner.lock().orders.get(order_id).cloned())
  }

  async fn list_orders(&self, email: Option<&str>) -> StoreResult<Vec<Order>> {
    let db = self.inner.lock();
    let orders = db
      .orders
      .values()
      .filter(|o| email.map_or(true, |e| o.email == e))
      .cloned()
      .collect();
    Ok(newest_first(orders, |o: &Order| o.created_at))
  }

  async fn list_orders_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Order>> {
    let db = self.inner.lock();
    let orders = db
      .orders
      .values()
      .filter(|o| o.ordered_items.iter().any(|i| i.owner == owner))
      .cloned()
      .collect();
    Ok(newest_first(orders, |o: &Order| o.created_at))
  }

  async fn update_order(&self, order_id: &str, update: OrderUpdate) -> StoreResult<Order> {
    let mut db = self.inner.lock();
    let order = db.order_mut(order_id)?;
    if let Some(status) = update.status {
      order.status = status;
    }
    if update.notes.is_some() {
      order.notes = update.notes;
    }
    order.updated_at = Utc::now();
    Ok(order.clone())
  }

  async fn cancel_order(&self, order_id: &str) -> StoreResult<Order> {
    let mut db = self.inner.lock();
    let order = db.order(order_id)?;
    let assignment = db.assignments.get(order_id).cloned();
    let agent = assignment
      .as_ref()
      .and_then(|a| db.agents.get(&a.delivery_agent_id).cloned());

    let (order, agent) = plan_cancellation(order, assignment.as_ref(), agent, Utc::now())?;
    if let Some(agent) = agent {
      db.agents.insert(agent.agent_id.clone(), agent);
    }
    db.assignments.remove(order_id);
    db.orders.insert(order.order_id.clone(), order.clone());
    Ok(order)
  }

  async fn set_order_item_status(&self, order_id: &str, product_id: Uuid, status: ItemStatus) -> StoreResult<Order> {
    let mut db = self.inner.lock();
    let order = db.order_mut(order_id)?;
    let item = order
      .ordered_items
      .iter_mut()
      .find(|i| i.product_id == product_id)
      .ok_or_else(|| StoreError::not_found("order item", product_id))?;
    item.status = status;
    order.updated_at = Utc::now();
    Ok(order.clone())
  }

  async fn create_agent(&self, agent: NewDeliveryAgent) -> StoreResult<DeliveryAgent> {
    let mut db = self.inner.lock();
    if db.agents.values().any(|a| a.email == agent.email) {
      return Err(StoreError::Conflict(format!(
        "A delivery agent with email {} already exists",
        agent.email
      )));
    }
    let agent_id = agent_id_from_sequence(db.bump(AGENT_SEQUENCE));
    let now = Utc::now();
    let record = DeliveryAgent {
      agent_id: agent_id.clone(),
      name: agent.name,
      email: agent.email,
      phone: agent.phone,
      vehicle_type: agent.vehicle_type,
      status: AgentStatus::Active,
      assigned_orders: 0,
      completed_deliveries: 0,
      rating: DeliveryAgent::INITIAL_RATING,
      created_at: now,
      updated_at: now,
    };
    db.agents.insert(agent_id, record.clone());
    Ok(record)
  }

  async fn find_agent(&self, agent_id: &str) -> StoreResult<Option<DeliveryAgent>> {
    Ok(self.inner.lock().agents.get(agent_id).cloned())
  }

  async fn list_agents(&self, status: Option<AgentStatus>) -> StoreResult<Vec<DeliveryAgent>> {
    let db = self.inner.lock();
    let mut agents: Vec<DeliveryAgent> = db
      .agents
      .values()
      .filter(|a| status.map_or(true, |s| a.status == s))
      .cloned()
      .collect();
    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    Ok(agents)
  }

  async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> StoreResult<DeliveryAgent> {
    let mut db = self.inner.lock();
    let agent = db
      .agents
      .get_mut(agent_id)
      .ok_or_else(|| StoreError::not_found("delivery agent", agent_id))?;
    if let Some(name) = update.name {
      agent.name = name;
    }
    if update.phone.is_some() {
      agent.phone = update.phone;
    }
    if update.vehicle_type.is_some() {
      agent.vehicle_type = update.vehicle_type;
    }
    if let Some(status) = update.status {
      agent.status = status;
    }
    if let Some(rating) = update.rating {
      agent.rating = rating;
    }
    agent.updated_at = Utc::now();
    Ok(agent.clone())
  }

  async fn delete_agent(&self, agent_id: &str) -> StoreResult<()> {
    let mut db = self.inner.lock();
    if !db.agents.contains_key(agent_id) {
      return Err(StoreError::not_found("delivery agent", agent_id));
    }
    let active_orders = db
      .orders
      .values()
      .filter(|o| o.delivery_agent_id.as_deref() == Some(agent_id) && o.status.is_out_for_delivery())
      .count();
    let active_assignments = db
      .assignments
      .values()
      .filter(|a| a.delivery_agent_id == agent_id && !a.status.is_terminal())
      .count();
    if active_orders > 0 || active_assignments > 0 {
      return Err(StoreError::Rejected(format!(
        "Delivery agent {} still has {} active order(s) and {} active assignment(s)",
        agent_id, active_orders, active_assignments
      )));
    }
    db.assignments.retain(|_, a| a.delivery_agent_id != agent_id);
    db.agents.remove(agent_id);
    Ok(())
  }

  async fn create_assignment(&self, assignment: NewAssignment) -> StoreResult<OrderAssignment> {
    let mut db = self.inner.lock();
    let order = db.order(&assignment.order_id)?;
    let agent = db.agent(&assignment.delivery_agent_id)?;
    let already_assigned = db.assignments.contains_key(&assignment.order_id);

    let plan = plan_new_assignment(order, agent, already_assigned, assignment, Utc::now())?;
    db.orders.insert(plan.order.order_id.clone(), plan.order);
    db.agents.insert(plan.agent.agent_id.clone(), plan.agent);
    db.assignments.insert(plan.assignment.order_id.clone(), plan.assignment.clone());
    Ok(plan.assignment)
  }

  async fn find_assignment(&self, order_id: &str) -> StoreResult<Option<OrderAssignment>> {
    Ok(self.inner.lock().assignments.get(order_id).cloned())
  }

  async fn list_assignments(&self, filter: AssignmentFilter) -> StoreResult<Vec<OrderAssignment>> {
    let db = self.inner.lock();
    let assignments = db.assignments.values().filter(|a| filter.matches(a)).cloned().collect();
    Ok(newest_first(assignments, |a: &OrderAssignment| a.assigned_date))
  }

  async fn update_assignment(&self, order_id: &str, update: AssignmentUpdate) -> StoreResult<OrderAssignment> {
    let mut db = self.inner.lock();
    let assignment = db
      .assignments
      .get(order_id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("order assignment", order_id))?;
    let order = db.order(order_id)?;
    let current = db.agent(&assignment.delivery_agent_id)?;
    let replacement = match update.agent_id.as_deref() {
      Some(next) if next != assignment.delivery_agent_id => Some(db.agent(next)?),
      _ => None,
    };

    let planned = plan_assignment_update(assignment, order, current, replacement, update, Utc::now())?;
    db.orders.insert(planned.order.order_id.clone(), planned.order);
    db.store_agents(planned.agents);
    db.assignments.insert(planned.assignment.order_id.clone(), planned.assignment.clone());
    Ok(planned.assignment)
  }

  async fn delete_assignment(&self, order_id: &str) -> StoreResult<()> {
    let mut db = self.inner.lock();
    let assignment = db
      .assignments
      .get(order_id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("order assignment", order_id))?;
    let order = db.order(order_id)?;
    let agent = db.agents.get(&assignment.delivery_agent_id).cloned();

    let (order, agent) = plan_assignment_removal(&assignment, order, agent, Utc::now());
    db.orders.insert(order.order_id.clone(), order);
    if let Some(agent) = agent {
      db.agents.insert(agent.agent_id.clone(), agent);
    }
    db.assignments.remove(order_id);
    Ok(())
  }

  async fn create_cart_order(&self, order: NewCartOrder) -> StoreResult<CartOrder> {
    let mut db = self.inner.lock();
    if db.cart_orders.contains_key(&order.order_id) {
      return Err(StoreError::Conflict(format!("Cart order {} already exists", order.order_id)));
    }
    let now = Utc::now();
    let record = CartOrder {
      order_id: order.order_id,
      user_id: order.user_id,
      items: order.items,
      amount_cents: order.amount_cents,
      currency: order.currency,
      status: CartOrderStatus::Pending,
      payment_id: None,
      status_code: None,
      created_at: now,
      updated_at: now,
    };
    db.cart_orders.insert(record.order_id.clone(), record.clone());
    Ok(record)
  }

  async fn find_cart_order(&self, order_id: &str) -> StoreResult<Option<CartOrder>> {
    Ok(self.inner.lock().cart_orders.get(order_id).cloned())
  }

  async fn list_cart_orders(&self, user_id: Uuid) -> StoreResult<Vec<CartOrder>> {
    let db = self.inner.lock();
    let orders = db.cart_orders.values().filter(|o| o.user_id == user_id).cloned().collect();
    Ok(newest_first(orders, |o: &CartOrder| o.created_at))
  }

  async fn settle_cart_order(&self, order_id: &str, result: CartPaymentResult) -> StoreResult<(CartOrder, bool)> {
    let mut db = self.inner.lock();
    let order = db
      .cart_orders
      .get_mut(order_id)
      .ok_or_else(|| StoreError::not_found("cart order", order_id))?;
    let changed = order.settle(&result, Utc::now());
    Ok((order.clone(), changed))
  }

  async fn create_subscription(&self, subscription: NewSubscription) -> StoreResult<FoodSubscription> {
    let mut db = self.inner.lock();
    if db.subscriptions.contains_key(&subscription.subscription_id) {
      return Err(StoreError::Conflict(format!(
        "Subscription {} already exists",
        subscription.subscription_id
      )));
    }
    let now = Utc::now();
    let record = FoodSubscription {
      subscription_id: subscription.subscription_id,
      user_id: subscription.user_id,
      plan_name: subscription.plan_name,
      amount_cents: subscription.amount_cents,
      currency: subscription.currency,
      frequency: subscription.frequency,
      status: SubscriptionStatus::Pending,
      auto_renew: true,
      renewal_attempts: 0,
      max_renewal_attempts: subscription.max_renewal_attempts,
      current_period_end: None,
      next_billing_date: None,
      recurring_token: None,
      renewal_history: Vec::new(),
      created_at: now,
      updated_at: now,
    };
    db.subscription_logs.push(FoodSubscriptionLog::new(
      &record.subscription_id,
      SubscriptionLogAction::Created,
      None,
      Some(record.amount_cents),
      format!("Subscription to '{}' created", record.plan_name),
      now,
    ));
    db.subscriptions.insert(record.subscription_id.clone(), record.clone());
    Ok(record)
  }

  async fn find_subscription(&self, subscription_id: &str) -> StoreResult<Option<FoodSubscription>> {
    Ok(self.inner.lock().subscriptions.get(subscription_id).cloned())
  }

  async fn list_subscriptions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<FoodSubscription>> {
    let db = self.inner.lock();
    let subs = db
      .subscriptions
      .values()
      .filter(|s| user_id.map_or(true, |u| s.user_id == u))
      .cloned()
      .collect();
    Ok(newest_first(subs, |s: &FoodSubscription| s.created_at))
  }

  async fn cancel_subscription(&self, subscription_id: &str, reason: &str) -> StoreResult<FoodSubscription> {
    let mut db = self.inner.lock();
    let now = Utc::now();
    let sub = db
      .subscriptions
      .get_mut(subscription_id)
      .ok_or_else(|| StoreError::not_found("subscription", subscription_id))?;
    sub.cancel(now);
    let sub = sub.clone();
    db.subscription_logs.push(FoodSubscriptionLog::new(
      subscription_id,
      SubscriptionLogAction::Cancelled,
      None,
      None,
      reason.to_string(),
      now,
    ));
    Ok(sub)
  }

  async fn settle_subscription(&self, subscription_id: &str, payment: SubscriptionPayment) -> StoreResult<SubscriptionSettlement> {
    let mut db = self.inner.lock();
    let sub = db
      .subscriptions
      .get_mut(subscription_id)
      .ok_or_else(|| StoreError::not_found("subscription", subscription_id))?;
    let logs = sub.apply_payment(&payment, Utc::now());
    let subscription = sub.clone();
    db.subscription_logs.extend(logs.iter().cloned());
    Ok(SubscriptionSettlement { subscription, logs })
  }

  async fn subscription_logs(&self, subscription_id: &str) -> StoreResult<Vec<FoodSubscriptionLog>> {
    let db = self.inner.lock();
    Ok(
      db.subscription_logs
        .iter()
        .filter(|l| l.subscription_id == subscription_id)
        .cloned()
        .collect(),
    )
  }
}
