// marketplace/src/models/cart.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub product_id: Uuid,
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
}

/// One cart per user; a missing cart reads as empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
  pub user_id: Uuid,
  pub items: Vec<CartLine>,
  pub updated_at: DateTime<Utc>,
}

impl Cart {
  pub fn empty(user_id: Uuid) -> Self {
    Self {
      user_id,
      items: Vec::new(),
      updated_at: Utc::now(),
    }
  }

  pub fn line(&self, product_id: Uuid) -> Option<&CartLine> {
    self.items.iter().find(|l| l.product_id == product_id)
  }

  /// Adds `quantity` to an existing line or appends a new one. The merged
  /// quantity must not exceed `max_quantity`; on refusal the cart is untouched
  /// and the quantity already in the cart is returned.
  pub fn merge_line(&mut self, product_id: Uuid, quantity: i32, max_quantity: i32, now: DateTime<Utc>) -> Result<(), i32> {
    let existing = self.line(product_id).map_or(0, |l| l.quantity);
    if existing + quantity > max_quantity {
      return Err(existing);
    }
    match self.items.iter_mut().find(|l| l.product_id == product_id) {
      Some(line) => line.quantity += quantity,
      None => self.items.push(CartLine {
        product_id,
        quantity,
        added_at: now,
      }),
    }
    self.updated_at = now;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merge_respects_stock_bound() {
    let pid = Uuid::new_v4();
    let now = Utc::now();
    let mut cart = Cart::empty(Uuid::new_v4());
    assert!(cart.merge_line(pid, 2, 5, now).is_ok());
    assert!(cart.merge_line(pid, 3, 5, now).is_ok());
    assert_eq!(cart.merge_line(pid, 1, 5, now), Err(5));
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
  }
}
