// marketplace/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub product_id: Uuid,
  pub product_name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub last_price_cents: Option<i64>,
  pub quantity_in_stock: i32,
  pub expiry_date: DateTime<Utc>,
  pub images: Vec<String>,
  pub owner: Uuid,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Product {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expiry_date < now
  }

  /// Visible to shoppers: in stock and not expired.
  pub fn is_active(&self, now: DateTime<Utc>) -> bool {
    self.quantity_in_stock > 0 && !self.is_expired(now)
  }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
  pub product_name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub quantity_in_stock: i32,
  pub expiry_date: DateTime<Utc>,
  pub images: Vec<String>,
  pub owner: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
  pub product_name: Option<String>,
  pub description: Option<String>,
  pub price_cents: Option<i64>,
  pub quantity_in_stock: Option<i32>,
  pub expiry_date: Option<DateTime<Utc>>,
  pub images: Option<Vec<String>>,
}

/// Listing filter; unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
  pub owner: Option<Uuid>,
  /// Only products in stock and not expired at this instant.
  pub active_at: Option<DateTime<Utc>>,
  /// Only products whose expiry falls in `[from, to]`.
  pub expiring_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ProductFilter {
  pub fn matches(&self, product: &Product) -> bool {
    if let Some(owner) = self.owner {
      if product.owner != owner {
        return false;
      }
    }
    if let Some(now) = self.active_at {
      if !product.is_active(now) {
        return false;
      }
    }
    if let Some((from, to)) = self.expiring_between {
      if product.expiry_date < from || product.expiry_date > to {
        return false;
      }
    }
    true
  }
}
