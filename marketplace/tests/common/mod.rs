// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{Duration, Utc};
use farmgate::config::{AppConfig, PayHereConfig, PayHereMode};
use farmgate::models::{format_cents, FarmerStatus, NewProduct, NewUser, PaymentNotification, Product, User, UserType};
use farmgate::services::auth_service::hash_password;
use farmgate::state::AppState;
use farmgate::store::MemoryStore;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "harvest-2024";
pub const MERCHANT_ID: &str = "1211149";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub fn test_config() -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 8080,
    database_url: None,
    run_migrations: false,
    app_base_url: "http://localhost:8080".to_string(),
    jwt_secret: "test-secret-do-not-use".to_string(),
    token_ttl_hours: 1,
    allow_admin_signup: false,
    payhere: PayHereConfig {
      merchant_id: MERCHANT_ID.to_string(),
      merchant_secret: "merchant-secret".to_string(),
      mode: PayHereMode::Sandbox,
      currency: "LKR".to_string(),
      return_url: "http://localhost:8080/payment/success".to_string(),
      cancel_url: "http://localhost:8080/payment/cancel".to_string(),
      notify_url: "http://localhost:8080/api/v1/payments/notify".to_string(),
      max_renewal_attempts: 3,
    },
  }
}

pub fn test_state() -> AppState {
  setup_tracing();
  AppState::new(Arc::new(MemoryStore::new()), test_config())
}

pub async fn create_user(state: &AppState, user_type: UserType, email: &str) -> User {
  let farmer = user_type == UserType::Farmer;
  state
    .store
    .create_user(NewUser {
      name: "Test Person".to_string(),
      email: email.to_string(),
      password_hash: hash_password(TEST_PASSWORD).unwrap(),
      user_type,
      phone: Some("0771234567".to_string()),
      address: Some("12 Temple Road, Kandy".to_string()),
      farm_name: farmer.then(|| "Green Acres".to_string()),
      farm_location: farmer.then(|| "Nuwara Eliya".to_string()),
      farmer_status: farmer.then_some(FarmerStatus::PendingPayment),
    })
    .await
    .unwrap()
}

pub async fn customer(state: &AppState) -> User {
  create_user(state, UserType::Customer, &format!("buyer-{}@example.com", Uuid::new_v4().simple())).await
}

pub async fn admin(state: &AppState) -> User {
  create_user(state, UserType::Admin, &format!("admin-{}@example.com", Uuid::new_v4().simple())).await
}

/// A farmer who has paid and been approved.
pub async fn approved_farmer(state: &AppState) -> User {
  let farmer = create_user(state, UserType::Farmer, &format!("farmer-{}@example.com", Uuid::new_v4().simple())).await;
  state
    .store
    .set_farmer_status(farmer.id, FarmerStatus::Approved, Some(true))
    .await
    .unwrap()
}

pub async fn product(state: &AppState, owner: &User, name: &str, price_cents: i64, stock: i32) -> Product {
  product_expiring_in(state, owner, name, price_cents, stock, Duration::days(30)).await
}

pub async fn product_expiring_in(
  state: &AppState,
  owner: &User,
  name: &str,
  price_cents: i64,
  stock: i32,
  expires_in: Duration,
) -> Product {
  state
    .store
    .create_product(NewProduct {
      product_name: name.to_string(),
      description: None,
      price_cents,
      quantity_in_stock: stock,
      expiry_date: Utc::now() + expires_in,
      images: vec![format!("https://img.example.com/{}.jpg", name.to_lowercase())],
      owner: owner.id,
    })
    .await
    .unwrap()
}

pub async fn stock_of(state: &AppState, product_id: Uuid) -> i32 {
  state.store.find_product(product_id).await.unwrap().unwrap().quantity_in_stock
}

pub fn bearer(state: &AppState, user: &User) -> (&'static str, String) {
  ("Authorization", format!("Bearer {}", state.tokens.issue(user).unwrap()))
}

/// A gateway notification carrying a valid signature.
pub fn signed_notification(state: &AppState, order_id: &str, amount_cents: i64, status_code: &str, purpose: &str) -> PaymentNotification {
  let currency = state.config.payhere.currency.clone();
  PaymentNotification {
    merchant_id: MERCHANT_ID.to_string(),
    order_id: order_id.to_string(),
    payhere_amount: format_cents(amount_cents),
    md5sig: state.signer.notification_signature(order_id, amount_cents, &currency, status_code),
    payhere_currency: currency,
    status_code: status_code.to_string(),
    custom_1: Some(purpose.to_string()),
    custom_2: None,
    payment_id: Some(format!("PAY-{}", Uuid::new_v4().simple())),
    recurring_token: None,
    next_occurrence_date: None,
  }
}
