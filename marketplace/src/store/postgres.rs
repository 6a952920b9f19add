// marketplace/src/store/postgres.rs

//! `MarketStore` over PostgreSQL. Multi-record writes run in one transaction
//! with the touched rows locked via `SELECT ... FOR UPDATE`.

use super::rules::{plan_assignment_removal, plan_assignment_update, plan_cancellation, plan_new_assignment};
use super::{MarketStore, StoreError, StoreResult, AGENT_SEQUENCE, ORDER_SEQUENCE};
use crate::models::delivery_agent::agent_id_from_sequence;
use crate::models::order::order_id_from_sequence;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(FromRow)]
struct CartRow {
  user_id: Uuid,
  items: Json<Vec<CartLine>>,
  updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
  fn from(row: CartRow) -> Self {
    Cart {
      user_id: row.user_id,
      items: row.items.0,
      updated_at: row.updated_at,
    }
  }
}

#[derive(FromRow)]
struct OrderRow {
  order_id: String,
  user_id: Uuid,
  email: String,
  name: String,
  address: String,
  phone: String,
  ordered_items: Json<Vec<OrderItem>>,
  total_cents: i64,
  status: OrderStatus,
  notes: Option<String>,
  delivery_agent_id: Option<String>,
  assigned_agent: Option<String>,
  assigned_at: Option<DateTime<Utc>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
  fn from(row: OrderRow) -> Self {
    Order {
      order_id: row.order_id,
      user_id: row.user_id,
      email: row.email,
      name: row.name,
      address: row.address,
      phone: row.phone,
      ordered_items: row.ordered_items.0,
      total_cents: row.total_cents,
      status: row.status,
      notes: row.notes,
      delivery_agent_id: row.delivery_agent_id,
      assigned_agent: row.assigned_agent,
      assigned_at: row.assigned_at,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

#[derive(FromRow)]
struct CartOrderRow {
  order_id: String,
  user_id: Uuid,
  items: Json<Vec<CartOrderItem>>,
  amount_cents: i64,
  currency: String,
  status: CartOrderStatus,
  payment_id: Option<String>,
  status_code: Option<String>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<CartOrderRow> for CartOrder {
  fn from(row: CartOrderRow) -> Self {
    CartOrder {
      order_id: row.order_id,
      user_id: row.user_id,
      items: row.items.0,
      amount_cents: row.amount_cents,
      currency: row.currency,
      status: row.status,
      payment_id: row.payment_id,
      status_code: row.status_code,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

#[derive(FromRow)]
struct SubscriptionRow {
  subscription_id: String,
  user_id: Uuid,
  plan_name: String,
  amount_cents: i64,
  currency: String,
  frequency: BillingFrequency,
  status: SubscriptionStatus,
  auto_renew: bool,
  renewal_attempts: i32,
  max_renewal_attempts: i32,
  current_period_end: Option<DateTime<Utc>>,
  next_billing_date: Option<DateTime<Utc>>,
  recurring_token: Option<String>,
  renewal_history: Json<Vec<RenewalRecord>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for FoodSubscription {
  fn from(row: SubscriptionRow) -> Self {
    FoodSubscription {
      subscription_id: row.subscription_id,
      user_id: row.user_id,
      plan_name: row.plan_name,
      amount_cents: row.amount_cents,
      currency: row.currency,
      frequency: row.frequency,
      status: row.status,
      auto_renew: row.auto_renew,
      renewal_attempts: row.renewal_attempts,
      max_renewal_attempts: row.max_renewal_attempts,
      current_period_end: row.current_period_end,
      next_billing_date: row.next_billing_date,
      recurring_token: row.recurring_token,
      renewal_history: row.renewal_history.0,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

/// Maps a unique-key violation to `Conflict`, anything else to `Sqlx`.
fn conflict_on_unique(err: sqlx::Error, message: String) -> StoreError {
  if let sqlx::Error::Database(db_err) = &err {
    if db_err.is_unique_violation() {
      return StoreError::Conflict(message);
    }
  }
  StoreError::Sqlx(err)
}

async fn bump_sequence(conn: &mut PgConnection, name: &str) -> StoreResult<i64> {
  let value = sqlx::query_scalar::<_, i64>(
    "INSERT INTO sequences (name, value) VALUES ($1, 1)
     ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
     RETURNING value",
  )
  .bind(name)
  .fetch_one(conn)
  .await?;
  Ok(value)
}

async fn lock_order(conn: &mut PgConnection, order_id: &str) -> StoreResult<Order> {
  sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1 FOR UPDATE")
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .map(Order::from)
    .ok_or_else(|| StoreError::not_found("order", order_id))
}

async fn lock_agent(conn: &mut PgConnection, agent_id: &str) -> StoreResult<Option<DeliveryAgent>> {
  let agent = sqlx::query_as::<_, DeliveryAgent>("SELECT * FROM delivery_agents WHERE agent_id = $1 FOR UPDATE")
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
  Ok(agent)
}

async fn find_assignment_for_update(conn: &mut PgConnection, order_id: &str) -> StoreResult<Option<OrderAssignment>> {
  let assignment = sqlx::query_as::<_, OrderAssignment>("SELECT * FROM order_assignments WHERE order_id = $1 FOR UPDATE")
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
  Ok(assignment)
}

async fn lock_assignment(conn: &mut PgConnection, order_id: &str) -> StoreResult<OrderAssignment> {
  find_assignment_for_update(conn, order_id)
    .await?
    .ok_or_else(|| StoreError::not_found("order assignment", order_id))
}

async fn write_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
  sqlx::query(
    "UPDATE orders SET ordered_items = $2, status = $3, notes = $4, delivery_agent_id = $5,
       assigned_agent = $6, assigned_at = $7, updated_at = $8
     WHERE order_id = $1",
  )
  .bind(&order.order_id)
  .bind(Json(&order.ordered_items))
  .bind(order.status)
  .bind(&order.notes)
  .bind(&order.delivery_agent_id)
  .bind(&order.assigned_agent)
  .bind(order.assigned_at)
  .bind(order.updated_at)
  .execute(conn)
  .await?;
  Ok(())
}

async fn write_agent_counters(conn: &mut PgConnection, agent: &DeliveryAgent) -> StoreResult<()> {
  sqlx::query(
    "UPDATE delivery_agents SET assigned_orders = $2, completed_deliveries = $3, updated_at = $4
     WHERE agent_id = $1",
  )
  .bind(&agent.agent_id)
  .bind(agent.assigned_orders)
  .bind(agent.completed_deliveries)
  .bind(agent.updated_at)
  .execute(conn)
  .await?;
  Ok(())
}

async fn write_subscription(conn: &mut PgConnection, sub: &FoodSubscription) -> StoreResult<()> {
  sqlx::query(
    "UPDATE food_subscriptions SET status = $2, auto_renew = $3, renewal_attempts = $4,
       current_period_end = $5, next_billing_date = $6, recurring_token = $7,
       renewal_history = $8, updated_at = $9
     WHERE subscription_id = $1",
  )
  .bind(&sub.subscription_id)
  .bind(sub.status)
  .bind(sub.auto_renew)
  .bind(sub.renewal_attempts)
  .bind(sub.current_period_end)
  .bind(sub.next_billing_date)
  .bind(&sub.recurring_token)
  .bind(Json(&sub.renewal_history))
  .bind(sub.updated_at)
  .execute(conn)
  .await?;
  Ok(())
}

async fn insert_log(conn: &mut PgConnection, log: &FoodSubscriptionLog) -> StoreResult<()> {
  sqlx::query(
    "INSERT INTO food_subscription_logs (id, subscription_id, action, status_code, amount_cents, message, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7)",
  )
  .bind(log.id)
  .bind(&log.subscription_id)
  .bind(log.action)
  .bind(&log.status_code)
  .bind(log.amount_cents)
  .bind(&log.message)
  .bind(log.created_at)
  .execute(conn)
  .await?;
  Ok(())
}

async fn write_cart(conn: &mut PgConnection, cart: &Cart) -> StoreResult<()> {
  sqlx::query(
    "INSERT INTO carts (user_id, items, updated_at) VALUES ($1, $2, $3)
     ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at",
  )
  .bind(cart.user_id)
  .bind(Json(&cart.items))
  .bind(cart.updated_at)
  .execute(conn)
  .await?;
  Ok(())
}

async fn lock_cart(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Cart> {
  // Ensure the row exists so FOR UPDATE has something to lock.
  sqlx::query("INSERT INTO carts (user_id, items, updated_at) VALUES ($1, '[]', NOW()) ON CONFLICT (user_id) DO NOTHING")
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
  let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1 FOR UPDATE")
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
  Ok(row.into())
}

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> StoreResult<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    Ok(Self::new(pool))
  }

  #[instrument(skip(self))]
  pub async fn migrate(&self) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    info!("Database migrations applied.");
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

#[async_trait]
impl MarketStore for PgStore {
  async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
    let mut conn = self.pool.acquire().await?;
    bump_sequence(&mut conn, name).await
  }

  async fn create_user(&self, user: NewUser) -> StoreResult<User> {
    let now = Utc::now();
    let email = user.email.clone();
    sqlx::query_as::<_, User>(
      "INSERT INTO users (id, name, email, password_hash, user_type, phone, address, farm_name, farm_location,
         farmer_status, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
       RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.user_type)
    .bind(user.phone)
    .bind(user.address)
    .bind(user.farm_name)
    .bind(user.farm_location)
    .bind(user.farmer_status)
    .bind(now)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("An account with email {} already exists", email)))
  }

  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(user)
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
      .bind(email)
      .fetch_optional(&self.pool)
      .await?;
    Ok(user)
  }

  async fn list_users(&self, user_type: Option<UserType>) -> StoreResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
      "SELECT * FROM users WHERE ($1::user_type IS NULL OR user_type = $1) ORDER BY created_at DESC",
    )
    .bind(user_type)
    .fetch_all(&self.pool)
    .await?;
    Ok(users)
  }

  async fn list_farmers_by_status(&self, status: FarmerStatus) -> StoreResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
      "SELECT * FROM users WHERE user_type = 'farmer' AND farmer_status = $1 ORDER BY created_at DESC",
    )
    .bind(status)
    .fetch_all(&self.pool)
    .await?;
    Ok(users)
  }

  async fn update_user_profile(&self, id: Uuid, update: UserProfileUpdate) -> StoreResult<User> {
    sqlx::query_as::<_, User>(
      "UPDATE users SET name = COALESCE($2, name), phone = COALESCE($3, phone), address = COALESCE($4, address),
         farm_name = COALESCE($5, farm_name), farm_location = COALESCE($6, farm_location), updated_at = NOW()
       WHERE id = $1
       RETURNING *",
    )
    .bind(id)
    .bind(update.name)
    .bind(update.phone)
    .bind(update.address)
    .bind(update.farm_name)
    .bind(update.farm_location)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("user", id))
  }

  async fn set_farmer_status(&self, id: Uuid, status: FarmerStatus, subscription_paid: Option<bool>) -> StoreResult<User> {
    sqlx::query_as::<_, User>(
      "UPDATE users SET farmer_status = $2, subscription_paid = COALESCE($3, subscription_paid), updated_at = NOW()
       WHERE id = $1
       RETURNING *",
    )
    .bind(id)
    .bind(status)
    .bind(subscription_paid)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("user", id))
  }

  async fn set_user_blocked(&self, id: Uuid, blocked: bool) -> StoreResult<User> {
    sqlx::query_as::<_, User>("UPDATE users SET is_blocked = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
      .bind(id)
      .bind(blocked)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::not_found("user", id))
  }

  async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
    let now = Utc::now();
    let product = sqlx::query_as::<_, Product>(
      "INSERT INTO products (product_id, product_name, description, price_cents, quantity_in_stock, expiry_date,
         images, owner, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
       RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(product.product_name)
    .bind(product.description)
    .bind(product.price_cents)
    .bind(product.quantity_in_stock)
    .bind(product.expiry_date)
    .bind(product.images)
    .bind(product.owner)
    .bind(now)
    .fetch_one(&self.pool)
    .await?;
    Ok(product)
  }

  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE product_id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(product)
  }

  async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>> {
    let (from, to) = filter.expiring_between.unzip();
    let products = sqlx::query_as::<_, Product>(
      "SELECT * FROM products
       WHERE ($1::uuid IS NULL OR owner = $1)
         AND ($2::timestamptz IS NULL OR (quantity_in_stock > 0 AND expiry_date >= $2))
         AND ($3::timestamptz IS NULL OR expiry_date >= $3)
         AND ($4::timestamptz IS NULL OR expiry_date <= $4)
       ORDER BY created_at DESC",
    )
    .bind(filter.owner)
    .bind(filter.active_at)
    .bind(from)
    .bind(to)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product> {
    sqlx::query_as::<_, Product>(
      "UPDATE products SET
         product_name = COALESCE($2, product_name),
         description = COALESCE($3, description),
         last_price_cents = CASE WHEN $4::bigint IS NOT NULL AND $4 <> price_cents THEN price_cents ELSE last_price_cents END,
         price_cents = COALESCE($4, price_cents),
         quantity_in_stock = COALESCE($5, quantity_in_stock),
         expiry_date = COALESCE($6, expiry_date),
         images = COALESCE($7, images),
         updated_at = NOW()
       WHERE product_id = $1
       RETURNING *",
    )
    .bind(id)
    .bind(update.product_name)
    .bind(update.description)
    .bind(update.price_cents)
    .bind(update.quantity_in_stock)
    .bind(update.expiry_date)
    .bind(update.images)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("product", id))
  }

  async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
      .bind(id)
      .execute(&self.pool)
      .await?;
    if result.rows_affected() == 0 {
      return Err(StoreError::not_found("product", id));
    }
    Ok(())
  }

  async fn reserve_stock(&self, id: Uuid, quantity: i32) -> StoreResult<Product> {
    let reserved = sqlx::query_as::<_, Product>(
      "UPDATE products SET quantity_in_stock = quantity_in_stock - $2, updated_at = NOW()
       WHERE product_id = $1 AND quantity_in_stock >= $2
       RETURNING *",
    )
    .bind(id)
    .bind(quantity)
    .fetch_optional(&self.pool)
    .await?;
    match reserved {
      Some(product) => Ok(product),
      None => match self.find_product(id).await? {
        Some(product) => Err(StoreError::InsufficientStock {
          product_id: id,
          available: product.quantity_in_stock,
          requested: quantity,
        }),
        None => Err(StoreError::not_found("product", id)),
      },
    }
  }

  async fn restore_stock(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
    let result = sqlx::query(
      "UPDATE products SET quantity_in_stock = quantity_in_stock + $2, updated_at = NOW() WHERE product_id = $1",
    )
    .bind(id)
    .bind(quantity)
    .execute(&self.pool)
    .await?;
    if result.rows_affected() == 0 {
      return Err(StoreError::not_found("product", id));
    }
    Ok(())
  }

  async fn delete_expired_products(&self, now: DateTime<Utc>) -> StoreResult<Vec<Product>> {
    let removed = sqlx::query_as::<_, Product>("DELETE FROM products WHERE expiry_date < $1 RETURNING *")
      .bind(now)
      .fetch_all(&self.pool)
      .await?;
    Ok(removed)
  }

  async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart> {
    let cart = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await?
      .map(Cart::from)
      .unwrap_or_else(|| Cart::empty(user_id));
    Ok(cart)
  }

  async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32, max_quantity: i32) -> StoreResult<Cart> {
    let mut tx = self.pool.begin().await?;
    let mut cart = lock_cart(&mut tx, user_id).await?;
    cart
      .merge_line(product_id, quantity, max_quantity, Utc::now())
      .map_err(|in_cart| {
        StoreError::Rejected(format!(
          "Only {} in stock; {} already in cart, {} requested",
          max_quantity, in_cart, quantity
        ))
      })?;
    write_cart(&mut tx, &cart).await?;
    tx.commit().await?;
    Ok(cart)
  }

  async fn set_cart_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> StoreResult<Cart> {
    let mut tx = self.pool.begin().await?;
    let mut cart = lock_cart(&mut tx, user_id).await?;
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
    write_cart(&mut tx, &cart).await?;
    tx.commit().await?;
    Ok(cart)
  }

  async fn remove_cart_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Cart> {
    self.set_cart_quantity(user_id, product_id, 0).await
  }

  async fn replace_cart_items(&self, user_id: Uuid, items: Vec<CartLine>) -> StoreResult<Cart> {
    let cart = Cart {
      user_id,
      items,
      updated_at: Utc::now(),
    };
    let mut conn = self.pool.acquire().await?;
    write_cart(&mut conn, &cart).await?;
    Ok(cart)
  }

  async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
    self.replace_cart_items(user_id, Vec::new()).await.map(|_| ())
  }

  async fn create_order(&self, order: NewOrder) -> StoreResult<Order> {
    let mut tx = self.pool.begin().await?;
    let order_id = order_id_from_sequence(bump_sequence(&mut tx, ORDER_SEQUENCE).await?);
    let now = Utc::now();
    let row = sqlx::query_as::<_, OrderRow>(
      "INSERT INTO orders (order_id, user_id, email, name, address, phone, ordered_items, total_cents, notes,
         created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
       RETURNING *",
    )
    .bind(&order_id)
    .bind(order.user_id)
    .bind(order.email)
    .bind(order.delivery.name)
    .bind(order.delivery.address)
    .bind(order.delivery.phone)
    .bind(Json(order.ordered_items))
    .bind(order.total_cents)
    .bind(order.delivery.notes)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
  }

  async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(Order::from))
  }

  async fn list_orders(&self, email: Option<&str>) -> StoreResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(
      "SELECT * FROM orders WHERE ($1::text IS NULL OR email = $1) ORDER BY created_at DESC",
    )
    .bind(email)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Order::from).collect())
  }

  async fn list_orders_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(
      "SELECT * FROM orders
       WHERE EXISTS (SELECT 1 FROM jsonb_array_elements(ordered_items) item WHERE item->>'owner' = $1)
       ORDER BY created_at DESC",
    )
    .bind(owner.to_string())
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Order::from).collect())
  }

  async fn update_order(&self, order_id: &str, update: OrderUpdate) -> StoreResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>(
      "UPDATE orders SET status = COALESCE($2, status), notes = COALESCE($3, notes), updated_at = NOW()
       WHERE order_id = $1
       RETURNING *",
    )
    .bind(order_id)
    .bind(update.status)
    .bind(update.notes)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("order", order_id))?;
    Ok(row.into())
  }

  async fn cancel_order(&self, order_id: &str) -> StoreResult<Order> {
    let mut tx = self.pool.begin().await?;
    let order = lock_order(&mut tx, order_id).await?;
    let assignment = find_assignment_for_update(&mut tx, order_id).await?;
    let agent = match &assignment {
      Some(a) => lock_agent(&mut tx, &a.delivery_agent_id).await?,
      None => None,
    };

    let (order, agent) = plan_cancellation(order, assignment.as_ref(), agent, Utc::now())?;
    if assignment.is_some() {
      sqlx::query("DELETE FROM order_assignments WHERE order_id = $1")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    }
    write_order(&mut tx, &order).await?;
    if let Some(agent) = agent {
      write_agent_counters(&mut tx, &agent).await?;
    }
    tx.commit().await?;
    Ok(order)
  }

  async fn set_order_item_status(&self, order_id: &str, product_id: Uuid, status: ItemStatus) -> StoreResult<Order> {
    let mut tx = self.pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    let item = order
      .ordered_items
      .iter_mut()
      .find(|i| i.product_id == product_id)
      .ok_or_else(|| StoreError::not_found("order item", product_id))?;
    item.status = status;
    order.updated_at = Utc::now();
    write_order(&mut tx, &order).await?;
    tx.commit().await?;
    Ok(order)
  }

  async fn create_agent(&self, agent: NewDeliveryAgent) -> StoreResult<DeliveryAgent> {
    let mut tx = self.pool.begin().await?;
    let agent_id = agent_id_from_sequence(bump_sequence(&mut tx, AGENT_SEQUENCE).await?);
    let email = agent.email.clone();
    let now = Utc::now();
    let created = sqlx::query_as::<_, DeliveryAgent>(
      "INSERT INTO delivery_agents (agent_id, name, email, phone, vehicle_type, rating, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
       RETURNING *",
    )
    .bind(&agent_id)
    .bind(agent.name)
    .bind(agent.email)
    .bind(agent.phone)
    .bind(agent.vehicle_type)
    .bind(DeliveryAgent::INITIAL_RATING)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, format!("A delivery agent with email {} already exists", email)))?;
    tx.commit().await?;
    Ok(created)
  }

  async fn find_agent(&self, agent_id: &str) -> StoreResult<Option<DeliveryAgent>> {
    let agent = sqlx::query_as::<_, DeliveryAgent>("SELECT * FROM delivery_agents WHERE agent_id = $1")
      .bind(agent_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(agent)
  }

  async fn list_agents(&self, status: Option<AgentStatus>) -> StoreResult<Vec<DeliveryAgent>> {
    let agents = sqlx::query_as::<_, DeliveryAgent>(
      "SELECT * FROM delivery_agents WHERE ($1::agent_status IS NULL OR status = $1) ORDER BY agent_id",
    )
    .bind(status)
    .fetch_all(&self.pool)
    .await?;
    Ok(agents)
  }

  async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> StoreResult<DeliveryAgent> {
    sqlx::query_as::<_, DeliveryAgent>(
      "UPDATE delivery_agents SET name = COALESCE($2, name), phone = COALESCE($3, phone),
         vehicle_type = COALESCE($4, vehicle_type), status = COALESCE($5, status), rating = COALESCE($6, rating),
         updated_at = NOW()
       WHERE agent_id = $1
       RETURNING *",
    )
    .bind(agent_id)
    .bind(update.name)
    .bind(update.phone)
    .bind(update.vehicle_type)
    .bind(update.status)
    .bind(update.rating)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::not_found("delivery agent", agent_id))
  }

  async fn delete_agent(&self, agent_id: &str) -> StoreResult<()> {
    let mut tx = self.pool.begin().await?;
    if lock_agent(&mut tx, agent_id).await?.is_none() {
      return Err(StoreError::not_found("delivery agent", agent_id));
    }
    let active_orders = sqlx::query_scalar::<_, i64>(
      "SELECT COUNT(*) FROM orders
       WHERE delivery_agent_id = $1 AND status IN ('Assigned', 'Picked Up', 'In Transit')",
    )
    .bind(agent_id)
    .fetch_one(&mut *tx)
    .await?;
    let active_assignments = sqlx::query_scalar::<_, i64>(
      "SELECT COUNT(*) FROM order_assignments
       WHERE delivery_agent_id = $1 AND status NOT IN ('Completed', 'Failed')",
    )
    .bind(agent_id)
    .fetch_one(&mut *tx)
    .await?;
    if active_orders > 0 || active_assignments > 0 {
      return Err(StoreError::Rejected(format!(
        "Delivery agent {} still has {} active order(s) and {} active assignment(s)",
        agent_id, active_orders, active_assignments
      )));
    }
    // Finished assignments reference the agent; drop them with it.
    sqlx::query("DELETE FROM order_assignments WHERE delivery_agent_id = $1")
      .bind(agent_id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM delivery_agents WHERE agent_id = $1")
      .bind(agent_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(())
  }

  async fn create_assignment(&self, assignment: NewAssignment) -> StoreResult<OrderAssignment> {
    let mut tx = self.pool.begin().await?;
    let order = lock_order(&mut tx, &assignment.order_id).await?;
    let agent = lock_agent(&mut tx, &assignment.delivery_agent_id)
      .await?
      .ok_or_else(|| StoreError::not_found("delivery agent", &assignment.delivery_agent_id))?;
    let already_assigned =
      sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM order_assignments WHERE order_id = $1)")
        .bind(&assignment.order_id)
        .fetch_one(&mut *tx)
        .await?;

    let plan = plan_new_assignment(order, agent, already_assigned, assignment, Utc::now())?;
    sqlx::query(
      "INSERT INTO order_assignments (order_id, delivery_agent_id, assigned_date, status, priority, notes, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&plan.assignment.order_id)
    .bind(&plan.assignment.delivery_agent_id)
    .bind(plan.assignment.assigned_date)
    .bind(plan.assignment.status)
    .bind(plan.assignment.priority)
    .bind(&plan.assignment.notes)
    .bind(plan.assignment.updated_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, format!("Order {} already has a delivery assignment", plan.order.order_id)))?;
    write_order(&mut tx, &plan.order).await?;
    write_agent_counters(&mut tx, &plan.agent).await?;
    tx.commit().await?;
    Ok(plan.assignment)
  }

  async fn find_assignment(&self, order_id: &str) -> StoreResult<Option<OrderAssignment>> {
    let assignment = sqlx::query_as::<_, OrderAssignment>("SELECT * FROM order_assignments WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(assignment)
  }

  async fn list_assignments(&self, filter: AssignmentFilter) -> StoreResult<Vec<OrderAssignment>> {
    let assignments = sqlx::query_as::<_, OrderAssignment>(
      "SELECT * FROM order_assignments
       WHERE ($1::text IS NULL OR delivery_agent_id = $1)
         AND ($2::assignment_status IS NULL OR status = $2)
       ORDER BY assigned_date DESC",
    )
    .bind(filter.agent_id)
    .bind(filter.status)
    .fetch_all(&self.pool)
    .await?;
    Ok(assignments)
  }

  async fn update_assignment(&self, order_id: &str, update: AssignmentUpdate) -> StoreResult<OrderAssignment> {
    let mut tx = self.pool.begin().await?;
    let assignment = lock_assignment(&mut tx, order_id).await?;
    let order = lock_order(&mut tx, order_id).await?;
    let current = lock_agent(&mut tx, &assignment.delivery_agent_id)
      .await?
      .ok_or_else(|| StoreError::not_found("delivery agent", &assignment.delivery_agent_id))?;
    let replacement = match update.agent_id.as_deref() {
      Some(next) if next != assignment.delivery_agent_id => Some(
        lock_agent(&mut tx, next)
          .await?
          .ok_or_else(|| StoreError::not_found("delivery agent", next))?,
      ),
      _ => None,
    };

    let planned = plan_assignment_update(assignment, order, current, replacement, update, Utc::now())?;
    sqlx::query(
      "UPDATE order_assignments SET delivery_agent_id = $2, status = $3, priority = $4, notes = $5, updated_at = $6
       WHERE order_id = $1",
    )
    .bind(&planned.assignment.order_id)
    .bind(&planned.assignment.delivery_agent_id)
    .bind(planned.assignment.status)
    .bind(planned.assignment.priority)
    .bind(&planned.assignment.notes)
    .bind(planned.assignment.updated_at)
    .execute(&mut *tx)
    .await?;
    write_order(&mut tx, &planned.order).await?;
    for agent in &planned.agents {
      write_agent_counters(&mut tx, agent).await?;
    }
    tx.commit().await?;
    Ok(planned.assignment)
  }

  async fn delete_assignment(&self, order_id: &str) -> StoreResult<()> {
    let mut tx = self.pool.begin().await?;
    let assignment = lock_assignment(&mut tx, order_id).await?;
    let order = lock_order(&mut tx, order_id).await?;
    let agent = lock_agent(&mut tx, &assignment.delivery_agent_id).await?;

    let (order, agent) = plan_assignment_removal(&assignment, order, agent, Utc::now());
    sqlx::query("DELETE FROM order_assignments WHERE order_id = $1")
      .bind(order_id)
      .execute(&mut *tx)
      .await?;
    write_order(&mut tx, &order).await?;
    if let Some(agent) = agent {
      write_agent_counters(&mut tx, &agent).await?;
    }
    tx.commit().await?;
    Ok(())
  }

  async fn create_cart_order(&self, order: NewCartOrder) -> StoreResult<CartOrder> {
    let now = Utc::now();
    let order_id = order.order_id.clone();
    let row = sqlx::query_as::<_, CartOrderRow>(
      "INSERT INTO cart_orders (order_id, user_id, items, amount_cents, currency, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $6)
       RETURNING *",
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(Json(order.items))
    .bind(order.amount_cents)
    .bind(order.currency)
    .bind(now)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("Cart order {} already exists", order_id)))?;
    Ok(row.into())
  }

  async fn find_cart_order(&self, order_id: &str) -> StoreResult<Option<CartOrder>> {
    let row = sqlx::query_as::<_, CartOrderRow>("SELECT * FROM cart_orders WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(CartOrder::from))
  }

  async fn list_cart_orders(&self, user_id: Uuid) -> StoreResult<Vec<CartOrder>> {
    let rows = sqlx::query_as::<_, CartOrderRow>("SELECT * FROM cart_orders WHERE user_id = $1 ORDER BY created_at DESC")
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.into_iter().map(CartOrder::from).collect())
  }

  async fn settle_cart_order(&self, order_id: &str, result: CartPaymentResult) -> StoreResult<(CartOrder, bool)> {
    let mut tx = self.pool.begin().await?;
    let mut order: CartOrder = sqlx::query_as::<_, CartOrderRow>("SELECT * FROM cart_orders WHERE order_id = $1 FOR UPDATE")
      .bind(order_id)
      .fetch_optional(&mut *tx)
      .await?
      .map(CartOrder::from)
      .ok_or_else(|| StoreError::not_found("cart order", order_id))?;
    let changed = order.settle(&result, Utc::now());
    if changed {
      sqlx::query("UPDATE cart_orders SET status = $2, payment_id = $3, status_code = $4, updated_at = $5 WHERE order_id = $1")
        .bind(&order.order_id)
        .bind(order.status)
        .bind(&order.payment_id)
        .bind(&order.status_code)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok((order, changed))
  }

  async fn create_subscription(&self, subscription: NewSubscription) -> StoreResult<FoodSubscription> {
    let now = Utc::now();
    let subscription_id = subscription.subscription_id.clone();
    let mut tx = self.pool.begin().await?;
    let row = sqlx::query_as::<_, SubscriptionRow>(
      "INSERT INTO food_subscriptions (subscription_id, user_id, plan_name, amount_cents, currency, frequency,
         max_renewal_attempts, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
       RETURNING *",
    )
    .bind(subscription.subscription_id)
    .bind(subscription.user_id)
    .bind(subscription.plan_name)
    .bind(subscription.amount_cents)
    .bind(subscription.currency)
    .bind(subscription.frequency)
    .bind(subscription.max_renewal_attempts)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, format!("Subscription {} already exists", subscription_id)))?;
    let created: FoodSubscription = row.into();
    let log = FoodSubscriptionLog::new(
      &created.subscription_id,
      SubscriptionLogAction::Created,
      None,
      Some(created.amount_cents),
      format!("Subscription to '{}' created", created.plan_name),
      now,
    );
    insert_log(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(created)
  }

  async fn find_subscription(&self, subscription_id: &str) -> StoreResult<Option<FoodSubscription>> {
    let row = sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM food_subscriptions WHERE subscription_id = $1")
      .bind(subscription_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(FoodSubscription::from))
  }

  async fn list_subscriptions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<FoodSubscription>> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
      "SELECT * FROM food_subscriptions WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(FoodSubscription::from).collect())
  }

  async fn cancel_subscription(&self, subscription_id: &str, reason: &str) -> StoreResult<FoodSubscription> {
    let mut tx = self.pool.begin().await?;
    let mut sub = lock_subscription(&mut tx, subscription_id).await?;
    let now = Utc::now();
    sub.cancel(now);
    write_subscription(&mut tx, &sub).await?;
    let log = FoodSubscriptionLog::new(
      subscription_id,
      SubscriptionLogAction::Cancelled,
      None,
      None,
      reason.to_string(),
      now,
    );
    insert_log(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(sub)
  }

  async fn settle_subscription(&self, subscription_id: &str, payment: SubscriptionPayment) -> StoreResult<SubscriptionSettlement> {
    let mut tx = self.pool.begin().await?;
    let mut subscription = lock_subscription(&mut tx, subscription_id).await?;
    let logs = subscription.apply_payment(&payment, Utc::now());
    write_subscription(&mut tx, &subscription).await?;
    for log in &logs {
      insert_log(&mut tx, log).await?;
    }
    tx.commit().await?;
    Ok(SubscriptionSettlement { subscription, logs })
  }

  async fn subscription_logs(&self, subscription_id: &str) -> StoreResult<Vec<FoodSubscriptionLog>> {
    let logs = sqlx::query_as::<_, FoodSubscriptionLog>(
      "SELECT * FROM food_subscription_logs WHERE subscription_id = $1 ORDER BY created_at",
    )
    .bind(subscription_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(logs)
  }
}

async fn lock_subscription(conn: &mut PgConnection, subscription_id: &str) -> StoreResult<FoodSubscription> {
  sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM food_subscriptions WHERE subscription_id = $1 FOR UPDATE")
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?
    .map(FoodSubscription::from)
    .ok_or_else(|| StoreError::not_found("subscription", subscription_id))
}
