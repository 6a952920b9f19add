// marketplace/src/store/mod.rs

//! Persistence boundary. Handlers and pipelines only talk to `MarketStore`.
//!
//! Each method that touches more than one record (orders with stock,
//! assignments with agents and orders, settlements with logs) is atomic in
//! every implementation: one transaction in `PgStore`, one lock hold in
//! `MemoryStore`.

use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
mod rules;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Counter names for `next_sequence`.
pub const ORDER_SEQUENCE: &str = "order";
pub const AGENT_SEQUENCE: &str = "delivery_agent";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{entity} not found: {key}")]
  NotFound { entity: &'static str, key: String },

  #[error("{0}")]
  Conflict(String),

  #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
  InsufficientStock {
    product_id: Uuid,
    available: i32,
    requested: i32,
  },

  /// The write is refused by a business precondition.
  #[error("{0}")]
  Rejected(String),

  #[error("Database error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
  pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
    StoreError::NotFound {
      entity,
      key: key.to_string(),
    }
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait MarketStore: Send + Sync {
  /// Atomically increments and returns the named counter (first value is 1).
  async fn next_sequence(&self, name: &str) -> StoreResult<i64>;

  // --- users ---
  /// `Conflict` when the email is taken.
  async fn create_user(&self, user: NewUser) -> StoreResult<User>;
  async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
  async fn list_users(&self, user_type: Option<UserType>) -> StoreResult<Vec<User>>;
  async fn list_farmers_by_status(&self, status: FarmerStatus) -> StoreResult<Vec<User>>;
  async fn update_user_profile(&self, id: Uuid, update: UserProfileUpdate) -> StoreResult<User>;
  /// Sets the onboarding status and, when given, the subscription flag.
  async fn set_farmer_status(&self, id: Uuid, status: FarmerStatus, subscription_paid: Option<bool>) -> StoreResult<User>;
  async fn set_user_blocked(&self, id: Uuid, blocked: bool) -> StoreResult<User>;

  // --- products ---
  async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;
  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
  async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>>;
  /// A price change moves the previous price into `last_price_cents`.
  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product>;
  async fn delete_product(&self, id: Uuid) -> StoreResult<()>;
  /// Conditional decrement: succeeds only while `stock >= quantity`.
  async fn reserve_stock(&self, id: Uuid, quantity: i32) -> StoreResult<Product>;
  async fn restore_stock(&self, id: Uuid, quantity: i32) -> StoreResult<()>;
  /// Deletes every product with `expiry_date < now` and returns them.
  async fn delete_expired_products(&self, now: DateTime<Utc>) -> StoreResult<Vec<Product>>;

  // --- carts ---
  async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart>;
  /// Merges `quantity` into the user's cart while the merged line stays
  /// within `max_quantity`, else `Rejected`.
  async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32, max_quantity: i32) -> StoreResult<Cart>;
  /// Quantity 0 removes the line. `NotFound` when the line is absent.
  async fn set_cart_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> StoreResult<Cart>;
  async fn remove_cart_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<Cart>;
  async fn replace_cart_items(&self, user_id: Uuid, items: Vec<CartLine>) -> StoreResult<Cart>;
  async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;

  // --- orders ---
  /// Allocates the next `CBCnnnn` id and stores the order as `processing`.
  async fn create_order(&self, order: NewOrder) -> StoreResult<Order>;
  async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>>;
  /// `None` lists every order.
  async fn list_orders(&self, email: Option<&str>) -> StoreResult<Vec<Order>>;
  /// Orders containing at least one item owned by `owner`.
  async fn list_orders_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Order>>;
  async fn update_order(&self, order_id: &str, update: OrderUpdate) -> StoreResult<Order>;
  /// `Rejected` once the order is shipped or completed. Any delivery
  /// assignment is deleted and its agent released in the same write.
  async fn cancel_order(&self, order_id: &str) -> StoreResult<Order>;
  async fn set_order_item_status(&self, order_id: &str, product_id: Uuid, status: ItemStatus) -> StoreResult<Order>;

  // --- delivery agents ---
  /// Allocates the next `DAnnn` id. `Conflict` when the email is taken.
  async fn create_agent(&self, agent: NewDeliveryAgent) -> StoreResult<DeliveryAgent>;
  async fn find_agent(&self, agent_id: &str) -> StoreResult<Option<DeliveryAgent>>;
  async fn list_agents(&self, status: Option<AgentStatus>) -> StoreResult<Vec<DeliveryAgent>>;
  async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> StoreResult<DeliveryAgent>;
  /// `Rejected` while the agent still has active orders or assignments.
  async fn delete_agent(&self, agent_id: &str) -> StoreResult<()>;

  // --- order assignments ---
  /// Inserts the assignment, bumps the agent's counter and marks the order
  /// `Assigned` with the agent fields set.
  async fn create_assignment(&self, assignment: NewAssignment) -> StoreResult<OrderAssignment>;
  async fn find_assignment(&self, order_id: &str) -> StoreResult<Option<OrderAssignment>>;
  async fn list_assignments(&self, filter: AssignmentFilter) -> StoreResult<Vec<OrderAssignment>>;
  /// Reassignment, status, priority and notes; status is mirrored onto the order.
  async fn update_assignment(&self, order_id: &str, update: AssignmentUpdate) -> StoreResult<OrderAssignment>;
  /// Deletes the assignment, releases the agent and returns the order to `processing`.
  async fn delete_assignment(&self, order_id: &str) -> StoreResult<()>;

  // --- payments ---
  async fn create_cart_order(&self, order: NewCartOrder) -> StoreResult<CartOrder>;
  async fn find_cart_order(&self, order_id: &str) -> StoreResult<Option<CartOrder>>;
  async fn list_cart_orders(&self, user_id: Uuid) -> StoreResult<Vec<CartOrder>>;
  /// Returns the order and whether this call changed it.
  async fn settle_cart_order(&self, order_id: &str, result: CartPaymentResult) -> StoreResult<(CartOrder, bool)>;

  /// Stores a pending subscription together with its `created` log entry.
  async fn create_subscription(&self, subscription: NewSubscription) -> StoreResult<FoodSubscription>;
  async fn find_subscription(&self, subscription_id: &str) -> StoreResult<Option<FoodSubscription>>;
  /// `None` lists every subscription.
  async fn list_subscriptions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<FoodSubscription>>;
  /// Cancels and appends the `cancelled` log entry.
  async fn cancel_subscription(&self, subscription_id: &str, reason: &str) -> StoreResult<FoodSubscription>;
  /// Applies the settlement rules and appends the resulting log entries.
  async fn settle_subscription(&self, subscription_id: &str, payment: SubscriptionPayment) -> StoreResult<SubscriptionSettlement>;
  async fn subscription_logs(&self, subscription_id: &str) -> StoreResult<Vec<FoodSubscriptionLog>>;
}
