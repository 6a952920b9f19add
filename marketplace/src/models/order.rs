// marketplace/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status")]
pub enum OrderStatus {
  #[serde(rename = "processing")]
  #[sqlx(rename = "processing")]
  Processing,
  #[serde(rename = "Assigned")]
  #[sqlx(rename = "Assigned")]
  Assigned,
  #[serde(rename = "Picked Up")]
  #[sqlx(rename = "Picked Up")]
  PickedUp,
  #[serde(rename = "In Transit")]
  #[sqlx(rename = "In Transit")]
  InTransit,
  #[serde(rename = "shipped")]
  #[sqlx(rename = "shipped")]
  Shipped,
  #[serde(rename = "completed")]
  #[sqlx(rename = "completed")]
  Completed,
  #[serde(rename = "cancelled")]
  #[sqlx(rename = "cancelled")]
  Cancelled,
}

impl OrderStatus {
  /// Once goods have left, an order can no longer be cancelled.
  pub fn is_cancellable(self) -> bool {
    !matches!(self, OrderStatus::Shipped | OrderStatus::Completed)
  }

  /// Completed and cancelled orders never move again.
  pub fn is_closed(self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
  }

  /// A delivery agent is actively working the order.
  pub fn is_out_for_delivery(self) -> bool {
    matches!(self, OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::InTransit)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
  Processing,
  Shipped,
  Completed,
  Cancelled,
}

/// Snapshot of a product at the moment it was ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub name: String,
  pub price_cents: i64,
  pub quantity: i32,
  pub image: Option<String>,
  pub product_id: Uuid,
  pub owner: Uuid,
  pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub order_id: String,
  pub user_id: Uuid,
  pub email: String,
  pub name: String,
  pub address: String,
  pub phone: String,
  pub ordered_items: Vec<OrderItem>,
  pub total_cents: i64,
  pub status: OrderStatus,
  pub notes: Option<String>,
  pub delivery_agent_id: Option<String>,
  pub assigned_agent: Option<String>,
  pub assigned_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// The same order restricted to the lines owned by `owner`, if it has any.
  pub fn for_owner(&self, owner: Uuid) -> Option<Order> {
    let items: Vec<OrderItem> = self.ordered_items.iter().filter(|i| i.owner == owner).cloned().collect();
    if items.is_empty() {
      return None;
    }
    Some(Order {
      ordered_items: items,
      ..self.clone()
    })
  }

  pub(crate) fn clear_assignment(&mut self) {
    self.delivery_agent_id = None;
    self.assigned_agent = None;
    self.assigned_at = None;
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryDetails {
  pub name: String,
  pub address: String,
  pub phone: String,
  pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
  pub user_id: Uuid,
  pub email: String,
  pub delivery: DeliveryDetails,
  pub ordered_items: Vec<OrderItem>,
  pub total_cents: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderUpdate {
  pub status: Option<OrderStatus>,
  pub notes: Option<String>,
}

/// Formats the human-facing order id, e.g. `CBC0007`.
pub fn order_id_from_sequence(seq: i64) -> String {
  format!("CBC{:04}", seq)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_wire_names() {
    assert_eq!(serde_json::to_string(&OrderStatus::PickedUp).unwrap(), "\"Picked Up\"");
    assert_eq!(serde_json::to_string(&OrderStatus::Processing).unwrap(), "\"processing\"");
    let parsed: OrderStatus = serde_json::from_str("\"In Transit\"").unwrap();
    assert_eq!(parsed, OrderStatus::InTransit);
  }

  #[test]
  fn order_ids_are_zero_padded() {
    assert_eq!(order_id_from_sequence(7), "CBC0007");
    assert_eq!(order_id_from_sequence(12345), "CBC12345");
  }

  #[test]
  fn cancellable_until_shipped() {
    assert!(OrderStatus::Processing.is_cancellable());
    assert!(OrderStatus::Assigned.is_cancellable());
    assert!(!OrderStatus::Shipped.is_cancellable());
    assert!(!OrderStatus::Completed.is_cancellable());
  }
}
