// marketplace/src/pipelines/common_steps.rs

//! Lookups and checks shared by several pipelines.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Product, User};
use crate::state::AppState;
use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Trims and lower-cases an email address, rejecting obviously bad input.
pub fn normalize_email(raw: &str) -> AppResult<String> {
  let email = raw.trim().to_lowercase();
  if email.is_empty() || !email.contains('@') {
    return Err(AppError::Validation("A valid email is required.".to_string()));
  }
  Ok(email)
}

/// Fetches a product a customer is about to buy: it must exist and must
/// not have expired.
#[instrument(name = "common_step::load_product_for_sale", skip(app_state), err(Display))]
pub async fn load_product_for_sale(app_state: &AppState, product_id: Uuid) -> AppResult<Product> {
  let product = app_state
    .store
    .find_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
  if product.is_expired(Utc::now()) {
    warn!(%product_id, "Product has expired.");
    return Err(AppError::Validation(format!(
      "Product '{}' has expired and can no longer be ordered",
      product.product_name
    )));
  }
  Ok(product)
}

pub fn issue_token(app_state: &AppState, user: &User) -> AppResult<String> {
  app_state.tokens.issue(user)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emails_are_normalized() {
    assert_eq!(normalize_email("  Ann@Farm.LK ").unwrap(), "ann@farm.lk");
    assert!(normalize_email("not-an-email").is_err());
    assert!(normalize_email("   ").is_err());
  }
}
