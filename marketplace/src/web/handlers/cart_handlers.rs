// marketplace/src/web/handlers/cart_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{format_cents, line_total_cents, sum_cents, Capability, Cart, CartLine, Product};
use crate::pipelines::contexts::AddToCartCtxData;
use crate::state::AppState;
use crate::web::handlers::{coerce_whole, ok, run_to_completion};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use farmgate_flow::ContextData;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartPayload {
  pub product_id: Uuid,
  pub quantity: Value,
}

#[derive(Deserialize, Debug)]
pub struct CartQuantityPayload {
  pub quantity: Value,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
  pub product_id: Uuid,
  pub quantity: i32,
  pub added_at: chrono::DateTime<Utc>,
  pub product: Product,
  pub subtotal_cents: i64,
  pub subtotal: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
  pub items: Vec<CartLineView>,
  pub total_cents: i64,
  pub total: String,
  pub item_count: i32,
}

impl CartView {
  fn build(lines: Vec<(CartLine, Product)>) -> AppResult<Self> {
    let too_large = || AppError::Validation("Cart total is too large.".to_string());
    let items = lines
      .into_iter()
      .map(|(line, product)| {
        let subtotal_cents = line_total_cents(product.price_cents, line.quantity).ok_or_else(too_large)?;
        Ok(CartLineView {
          product_id: line.product_id,
          quantity: line.quantity,
          added_at: line.added_at,
          product,
          subtotal_cents,
          subtotal: format_cents(subtotal_cents),
        })
      })
      .collect::<AppResult<Vec<CartLineView>>>()?;
    let total_cents = sum_cents(items.iter().map(|i| i.subtotal_cents)).ok_or_else(too_large)?;
    let item_count = items.iter().map(|i| i.quantity).sum();
    Ok(Self {
      items,
      total_cents,
      total: format_cents(total_cents),
      item_count,
    })
  }
}

/// The user's cart lines paired with their products. Lines whose product
/// is gone or expired are dropped, and the cart is rewritten without them.
#[instrument(name = "cart::load_valid_lines", skip(app_state))]
pub(crate) async fn load_valid_lines(app_state: &AppState, user_id: Uuid) -> AppResult<Vec<(CartLine, Product)>> {
  let cart = app_state.store.get_cart(user_id).await?;
  let now = Utc::now();
  let mut valid = Vec::with_capacity(cart.items.len());
  for line in &cart.items {
    match app_state.store.find_product(line.product_id).await? {
      Some(product) if !product.is_expired(now) => valid.push((line.clone(), product)),
      _ => warn!(product_id = %line.product_id, "Dropping unavailable product from cart."),
    }
  }
  if valid.len() != cart.items.len() {
    let kept = valid.iter().map(|(line, _)| line.clone()).collect();
    app_state.store.replace_cart_items(user_id, kept).await?;
  }
  Ok(valid)
}

#[instrument(
  name = "handler::add_to_cart",
  skip(app_state, caller, req_payload),
  fields(user_id = %caller.id(), product_id = %req_payload.product_id)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<AddToCartPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let quantity = coerce_whole(&req_payload.quantity, "quantity")?;

  let ctx_data = ContextData::new(AddToCartCtxData {
    app_state: app_state.get_ref().clone(),
    user_id: caller.id(),
    product_id: req_payload.product_id,
    quantity,
    product: None,
    cart: None,
  });
  run_to_completion(&app_state, ctx_data.clone(), "add-to-cart").await?;

  let cart: Cart = ctx_data
    .read()
    .cart
    .clone()
    .ok_or_else(|| AppError::Internal("Add to cart completed without a cart.".to_string()))?;
  Ok(ok("Product added to cart", json!({ "cart": cart })))
}

#[instrument(name = "handler::get_cart", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn get_cart_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let view = CartView::build(load_valid_lines(&app_state, caller.id()).await?)?;
  Ok(ok("Cart retrieved", json!({ "cart": view })))
}

#[instrument(name = "handler::update_cart_item", skip(app_state, caller, req_payload), fields(user_id = %caller.id(), product_id = %path))]
pub async fn update_cart_item_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<CartQuantityPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let product_id = path.into_inner();
  let quantity = coerce_whole(&req_payload.quantity, "quantity")?;
  if quantity < 0 {
    return Err(AppError::Validation("quantity cannot be negative".to_string()));
  }
  if quantity > 0 {
    let product = app_state
      .store
      .find_product(product_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
    if quantity > product.quantity_in_stock {
      return Err(AppError::Validation(format!(
        "Only {} units of '{}' are in stock",
        product.quantity_in_stock, product.product_name
      )));
    }
  }
  let cart = app_state.store.set_cart_quantity(caller.id(), product_id, quantity).await?;
  info!(quantity, "Cart line updated.");
  Ok(ok("Cart updated", json!({ "cart": cart })))
}

#[instrument(name = "handler::remove_cart_item", skip(app_state, caller), fields(user_id = %caller.id(), product_id = %path))]
pub async fn remove_cart_item_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let cart = app_state.store.remove_cart_line(caller.id(), path.into_inner()).await?;
  Ok(ok("Item removed from cart", json!({ "cart": cart })))
}

#[instrument(name = "handler::clear_cart", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn clear_cart_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  app_state.store.clear_cart(caller.id()).await?;
  Ok(ok("Cart cleared", json!({})))
}
