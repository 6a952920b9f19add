// marketplace/src/web/handlers/utility_handlers.rs

//! Inventory housekeeping around product expiry.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Capability, Product, ProductFilter};
use crate::state::AppState;
use crate::web::handlers::ok;
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, instrument};
use uuid::Uuid;

pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 7;
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 365;
pub const EXPIRING_SOON_DAYS: i64 = 5;
pub const LOW_STOCK_THRESHOLD: i32 = 10;

#[derive(Deserialize, Debug, Default)]
pub struct ExpiringQuery {
  pub days: Option<i64>,
}

/// Admins look at every product, farmers at their own.
fn inventory_owner(caller: &AuthenticatedUser) -> AppResult<Option<Uuid>> {
  if caller.can(Capability::ManageAnyProduct) {
    Ok(None)
  } else if caller.can(Capability::ManageOwnProducts) {
    Ok(Some(caller.id()))
  } else {
    Err(AppError::Forbidden("Only admins and farmers can view inventory reports".to_string()))
  }
}

#[instrument(name = "handler::delete_expired_products", skip(app_state, caller))]
pub async fn delete_expired_products_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageAnyProduct)?;
  let removed = app_state.store.delete_expired_products(Utc::now()).await?;
  info!(count = removed.len(), "Expired products deleted.");
  Ok(ok(
    "Expired products deleted",
    json!({ "deletedCount": removed.len(), "deletedProducts": removed }),
  ))
}

#[instrument(name = "handler::expiring_products", skip(app_state, caller))]
pub async fn expiring_products_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  query: web::Query<ExpiringQuery>,
) -> AppResult<HttpResponse> {
  let owner = inventory_owner(&caller)?;
  let days = query.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
  if !(1..=MAX_EXPIRY_WINDOW_DAYS).contains(&days) {
    return Err(AppError::Validation(format!(
      "days must be between 1 and {}",
      MAX_EXPIRY_WINDOW_DAYS
    )));
  }
  let now = Utc::now();
  let products = app_state
    .store
    .list_products(ProductFilter {
      owner,
      active_at: None,
      expiring_between: Some((now, now + Duration::days(days))),
    })
    .await?;
  Ok(ok(
    "Expiring products retrieved",
    json!({ "days": days, "count": products.len(), "products": products }),
  ))
}

/// Whole days until expiry, counted down from `now`.
fn days_remaining(product: &Product, now: DateTime<Utc>) -> i64 {
  (product.expiry_date - now).num_days()
}

fn group_by_days_remaining(products: Vec<Product>, now: DateTime<Utc>) -> BTreeMap<i64, Vec<Product>> {
  let mut groups: BTreeMap<i64, Vec<Product>> = (0..=EXPIRING_SOON_DAYS).map(|d| (d, Vec::new())).collect();
  for product in products {
    let days = days_remaining(&product, now).clamp(0, EXPIRING_SOON_DAYS);
    groups.entry(days).or_default().push(product);
  }
  groups
}

#[instrument(name = "handler::expiring_soon", skip(app_state, caller))]
pub async fn expiring_soon_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let owner = inventory_owner(&caller)?;
  let now = Utc::now();
  let products = app_state
    .store
    .list_products(ProductFilter {
      owner,
      active_at: None,
      expiring_between: Some((now, now + Duration::days(EXPIRING_SOON_DAYS))),
    })
    .await?;
  let total = products.len();
  let groups: BTreeMap<String, Vec<Product>> = group_by_days_remaining(products, now)
    .into_iter()
    .map(|(days, items)| (days.to_string(), items))
    .collect();
  Ok(ok(
    "Products expiring soon retrieved",
    json!({ "windowDays": EXPIRING_SOON_DAYS, "count": total, "groups": groups }),
  ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
  Critical,
  Warning,
  Healthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryHealth {
  pub total_products: usize,
  pub expired: usize,
  pub expiring_soon: usize,
  pub low_stock: usize,
  pub status: InventoryStatus,
}

impl InventoryHealth {
  pub fn assess(products: &[Product], now: DateTime<Utc>) -> Self {
    let soon = now + Duration::days(DEFAULT_EXPIRY_WINDOW_DAYS);
    let expired = products.iter().filter(|p| p.is_expired(now)).count();
    let expiring_soon = products
      .iter()
      .filter(|p| !p.is_expired(now) && p.expiry_date <= soon)
      .count();
    let low_stock = products
      .iter()
      .filter(|p| p.quantity_in_stock > 0 && p.quantity_in_stock < LOW_STOCK_THRESHOLD)
      .count();
    let status = if expired > 0 {
      InventoryStatus::Critical
    } else if expiring_soon > 0 || low_stock > 0 {
      InventoryStatus::Warning
    } else {
      InventoryStatus::Healthy
    };
    Self {
      total_products: products.len(),
      expired,
      expiring_soon,
      low_stock,
      status,
    }
  }
}

#[instrument(name = "handler::inventory_health", skip(app_state, caller))]
pub async fn inventory_health_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let owner = inventory_owner(&caller)?;
  let products = app_state
    .store
    .list_products(ProductFilter {
      owner,
      ..ProductFilter::default()
    })
    .await?;
  let health = InventoryHealth::assess(&products, Utc::now());
  Ok(ok("Inventory health retrieved", json!({ "health": health })))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn product(expires_in_hours: i64, stock: i32, now: DateTime<Utc>) -> Product {
    Product {
      product_id: Uuid::new_v4(),
      product_name: "Leeks".to_string(),
      description: None,
      price_cents: 100,
      last_price_cents: None,
      quantity_in_stock: stock,
      expiry_date: now + Duration::hours(expires_in_hours),
      images: Vec::new(),
      owner: Uuid::nil(),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn health_status_escalates() {
    let now = Utc::now();
    let healthy = InventoryHealth::assess(&[product(24 * 30, 50, now)], now);
    assert_eq!(healthy.status, InventoryStatus::Healthy);

    let low = InventoryHealth::assess(&[product(24 * 30, 3, now)], now);
    assert_eq!(low.status, InventoryStatus::Warning);
    assert_eq!(low.low_stock, 1);

    let out_of_stock = InventoryHealth::assess(&[product(24 * 30, 0, now)], now);
    assert_eq!(out_of_stock.low_stock, 0);

    let expired = InventoryHealth::assess(&[product(-1, 50, now), product(48, 50, now)], now);
    assert_eq!(expired.status, InventoryStatus::Critical);
    assert_eq!((expired.expired, expired.expiring_soon), (1, 1));
  }

  #[test]
  fn grouping_uses_whole_days() {
    let now = Utc::now();
    let groups = group_by_days_remaining(vec![product(2, 5, now), product(24 * 3 + 1, 5, now)], now);
    assert_eq!(groups.len(), 6);
    assert_eq!(groups[&0].len(), 1);
    assert_eq!(groups[&3].len(), 1);
    assert!(groups[&5].is_empty());
  }
}
