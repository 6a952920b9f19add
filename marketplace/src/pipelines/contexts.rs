// marketplace/src/pipelines/contexts.rs

//! Data carried through each pipeline. Handlers receive these wrapped in
//! `farmgate_flow::ContextData`.

use crate::models::{
  Cart, DeliveryDetails, NewAssignment, Order, OrderAssignment, OrderItem, PaymentNotification, Product, User,
};
use crate::services::payhere::PaymentPurpose;
use crate::state::AppState;
use serde::Deserialize;
use uuid::Uuid;

// --- Accounts ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInput {
  pub name: String,
  pub email: String,
  pub password: String,
  #[serde(rename = "type", default)]
  pub user_type: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub farm_name: Option<String>,
  pub farm_location: Option<String>,
}

#[derive(Clone)]
pub struct SignupCtxData {
  pub app_state: AppState,
  pub input: RegistrationInput,
  pub created_user: Option<User>,
  pub token: Option<String>,
}

#[derive(Clone)]
pub struct SigninCtxData {
  pub app_state: AppState,
  pub email: String,
  pub password: String,
  pub user: Option<User>,
  pub token: Option<String>,
}

// --- Cart ---

#[derive(Clone)]
pub struct AddToCartCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub product: Option<Product>,
  pub cart: Option<Cart>,
}

// --- Order placement ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedLine {
  pub product_id: Uuid,
  pub quantity: i32,
}

/// Where the lines of a new order come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSource {
  Cart,
  Direct,
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub email: String,
  pub source: OrderSource,
  pub delivery: DeliveryDetails,
  /// Filled from the cart, or supplied by the caller for direct orders.
  pub lines: Vec<RequestedLine>,
  pub priced_items: Vec<OrderItem>,
  pub total_cents: i64,
  /// Stock taken so far, `(product_id, quantity)`. Undone on failure.
  pub reserved: Vec<(Uuid, i32)>,
  pub order: Option<Order>,
  pub cart_cleared: bool,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, user: &User, source: OrderSource, delivery: DeliveryDetails, lines: Vec<RequestedLine>) -> Self {
    Self {
      app_state,
      user_id: user.id,
      email: user.email.clone(),
      source,
      delivery,
      lines,
      priced_items: Vec::new(),
      total_cents: 0,
      reserved: Vec::new(),
      order: None,
      cart_cleared: false,
    }
  }
}

// --- Delivery ---

#[derive(Clone)]
pub struct AssignmentCtxData {
  pub app_state: AppState,
  pub request: NewAssignment,
  pub assignment: Option<OrderAssignment>,
  pub order: Option<Order>,
}

// --- Payments ---

/// What a verified notification settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
  CartOrder,
  Subscription,
}

impl From<PaymentPurpose> for NotificationTarget {
  fn from(purpose: PaymentPurpose) -> Self {
    match purpose {
      PaymentPurpose::Cart => NotificationTarget::CartOrder,
      PaymentPurpose::Subscription => NotificationTarget::Subscription,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
  BadSignature,
  UnknownOrder,
  CartOrderSettled { changed: bool },
  SubscriptionSettled,
}

#[derive(Clone)]
pub struct PaymentNotificationCtxData {
  pub app_state: AppState,
  pub notification: PaymentNotification,
  pub target: Option<NotificationTarget>,
  pub outcome: Option<NotificationOutcome>,
}
