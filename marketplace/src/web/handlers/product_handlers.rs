// marketplace/src/web/handlers/product_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{format_cents, parse_date_time, to_cents, Capability, MAX_AMOUNT_CENTS, MAX_STOCK, NewProduct, Product, ProductFilter, ProductUpdate, UserType};
use crate::state::AppState;
use crate::web::handlers::{coerce_number, coerce_whole, created, current_user, ok};
use crate::web::{AuthenticatedUser, MaybeUser};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Product fields as posted by clients. Numbers may arrive as strings.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
  pub product_name: Option<String>,
  pub description: Option<String>,
  pub price: Option<Value>,
  pub quantity_in_stock: Option<Value>,
  pub expiry_date: Option<String>,
  pub images: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
pub struct ReduceStockPayload {
  pub quantity: Value,
}

fn parse_price(value: &Value) -> AppResult<i64> {
  let price = coerce_number(value, "price")?;
  if price <= 0.0 {
    return Err(AppError::Validation("price must be greater than zero".to_string()));
  }
  match to_cents(price) {
    Some(cents) if cents > 0 => Ok(cents),
    Some(_) => Err(AppError::Validation("price must be greater than zero".to_string())),
    None => Err(AppError::Validation(format!(
      "price cannot exceed {}",
      format_cents(MAX_AMOUNT_CENTS)
    ))),
  }
}

fn parse_stock(value: &Value) -> AppResult<i32> {
  let stock = coerce_whole(value, "quantityInStock")?;
  if stock < 0 {
    return Err(AppError::Validation("quantityInStock cannot be negative".to_string()));
  }
  if stock > MAX_STOCK {
    return Err(AppError::Validation(format!("quantityInStock cannot exceed {}", MAX_STOCK)));
  }
  Ok(stock)
}

fn parse_expiry(raw: &str, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
  let expiry = parse_date_time(raw).ok_or_else(|| AppError::Validation("expiryDate is not a valid date".to_string()))?;
  if expiry <= now {
    return Err(AppError::Validation("expiryDate must be in the future".to_string()));
  }
  Ok(expiry)
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ProductPayload {
  fn into_new_product(self, owner: Uuid, now: DateTime<Utc>) -> AppResult<NewProduct> {
    let missing = || AppError::Validation("productName, price, quantityInStock and expiryDate are required".to_string());
    let product_name = non_empty(self.product_name).ok_or_else(missing)?;
    let price_cents = parse_price(self.price.as_ref().ok_or_else(missing)?)?;
    let quantity_in_stock = parse_stock(self.quantity_in_stock.as_ref().ok_or_else(missing)?)?;
    let expiry_date = parse_expiry(self.expiry_date.as_deref().ok_or_else(missing)?, now)?;
    Ok(NewProduct {
      product_name,
      description: non_empty(self.description),
      price_cents,
      quantity_in_stock,
      expiry_date,
      images: self.images.unwrap_or_default(),
      owner,
    })
  }

  fn into_update(self, now: DateTime<Utc>) -> AppResult<ProductUpdate> {
    if self.product_name.as_deref().map_or(false, |n| n.trim().is_empty()) {
      return Err(AppError::Validation("productName cannot be empty".to_string()));
    }
    Ok(ProductUpdate {
      product_name: non_empty(self.product_name),
      description: self.description,
      price_cents: self.price.as_ref().map(parse_price).transpose()?,
      quantity_in_stock: self.quantity_in_stock.as_ref().map(parse_stock).transpose()?,
      expiry_date: self.expiry_date.as_deref().map(|raw| parse_expiry(raw, now)).transpose()?,
      images: self.images,
    })
  }
}

async fn find_product(app_state: &AppState, product_id: Uuid) -> AppResult<Product> {
  app_state
    .store
    .find_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
}

/// Admins may change any product, farmers only their own.
fn ensure_can_modify(caller: &AuthenticatedUser, product: &Product) -> AppResult<()> {
  if caller.can(Capability::ManageAnyProduct) {
    return Ok(());
  }
  if caller.can(Capability::ManageOwnProducts) && product.owner == caller.id() {
    return Ok(());
  }
  warn!(product_id = %product.product_id, "Caller does not own the product.");
  Err(AppError::Forbidden("You can only modify your own products".to_string()))
}

#[instrument(name = "handler::create_product", skip(app_state, caller, req_payload), fields(user_id = %caller.id()))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<ProductPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageOwnProducts)?;
  // Approval may have changed since the token was issued.
  let farmer = current_user(&app_state, &caller).await?;
  if !farmer.can_sell() {
    return Err(AppError::Forbidden(
      "Your farmer account must be paid and approved before listing products".to_string(),
    ));
  }

  let new_product = req_payload.into_inner().into_new_product(farmer.id, Utc::now())?;
  let product = app_state.store.create_product(new_product).await?;
  info!(product_id = %product.product_id, "Product created.");
  Ok(created("Product created successfully", json!({ "product": product })))
}

#[instrument(name = "handler::list_products", skip(app_state, caller))]
pub async fn list_products_handler(app_state: web::Data<AppState>, caller: MaybeUser) -> AppResult<HttpResponse> {
  let filter = match caller.0.as_ref().map(|c| (c.user_type(), c.id())) {
    Some((UserType::Admin, _)) => ProductFilter::default(),
    Some((UserType::Farmer, id)) => ProductFilter {
      owner: Some(id),
      ..ProductFilter::default()
    },
    Some((UserType::Customer, _)) | None => ProductFilter {
      active_at: Some(Utc::now()),
      ..ProductFilter::default()
    },
  };
  let products = app_state.store.list_products(filter).await?;
  Ok(ok("Products retrieved", json!({ "count": products.len(), "products": products })))
}

#[instrument(name = "handler::get_product", skip(app_state), fields(product_id = %path))]
pub async fn get_product_handler(app_state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
  let product = find_product(&app_state, path.into_inner()).await?;
  Ok(ok("Product retrieved", json!({ "product": product })))
}

#[instrument(name = "handler::update_product", skip(app_state, caller, req_payload), fields(product_id = %path))]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<ProductPayload>,
) -> AppResult<HttpResponse> {
  let product = find_product(&app_state, path.into_inner()).await?;
  ensure_can_modify(&caller, &product)?;
  let update = req_payload.into_inner().into_update(Utc::now())?;
  let product = app_state.store.update_product(product.product_id, update).await?;
  info!("Product updated.");
  Ok(ok("Product updated successfully", json!({ "product": product })))
}

#[instrument(name = "handler::delete_product", skip(app_state, caller), fields(product_id = %path))]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  let product = find_product(&app_state, path.into_inner()).await?;
  ensure_can_modify(&caller, &product)?;
  app_state.store.delete_product(product.product_id).await?;
  info!("Product deleted.");
  Ok(ok("Product deleted successfully", json!({ "productId": product.product_id })))
}

#[instrument(name = "handler::reduce_stock", skip(app_state, caller, req_payload), fields(product_id = %path))]
pub async fn reduce_stock_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<ReduceStockPayload>,
) -> AppResult<HttpResponse> {
  let quantity = coerce_whole(&req_payload.quantity, "quantity")?;
  if quantity < 1 {
    return Err(AppError::Validation("quantity must be at least 1".to_string()));
  }
  let product = find_product(&app_state, path.into_inner()).await?;
  ensure_can_modify(&caller, &product)?;
  let product = app_state.store.reserve_stock(product.product_id, quantity).await?;
  info!(quantity, remaining = product.quantity_in_stock, "Stock reduced.");
  Ok(ok("Stock reduced successfully", json!({ "product": product })))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn new_product_requires_future_expiry_and_positive_price() {
    let now = Utc::now();
    let tomorrow = (now + Duration::days(1)).format("%Y-%m-%d").to_string();
    let payload = |price: Value, expiry: &str| ProductPayload {
      product_name: Some("Carrots".into()),
      price: Some(price),
      quantity_in_stock: Some(json!("12")),
      expiry_date: Some(expiry.to_string()),
      ..ProductPayload::default()
    };

    let product = payload(json!("150.5"), &tomorrow).into_new_product(Uuid::nil(), now).unwrap();
    assert_eq!(product.price_cents, 15050);
    assert_eq!(product.quantity_in_stock, 12);

    assert!(payload(json!(0), &tomorrow).into_new_product(Uuid::nil(), now).is_err());
    assert!(payload(json!(10), "2001-01-01").into_new_product(Uuid::nil(), now).is_err());
    assert!(ProductPayload::default().into_new_product(Uuid::nil(), now).is_err());
  }

  #[test]
  fn oversized_price_or_stock_is_rejected() {
    assert!(parse_price(&json!(1e17)).is_err());
    assert!(parse_price(&json!("0.001")).is_err());
    assert_eq!(parse_price(&json!(1_000_000_000)).unwrap(), MAX_AMOUNT_CENTS);
    assert!(parse_stock(&json!(MAX_STOCK + 1)).is_err());
    assert_eq!(parse_stock(&json!(MAX_STOCK)).unwrap(), MAX_STOCK);
  }
}
