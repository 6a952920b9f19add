// marketplace/src/models/assignment.rs

use super::order::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_status")]
pub enum AssignmentStatus {
  #[serde(rename = "Assigned")]
  #[sqlx(rename = "Assigned")]
  Assigned,
  #[serde(rename = "In Progress")]
  #[sqlx(rename = "In Progress")]
  InProgress,
  #[serde(rename = "Picked Up")]
  #[sqlx(rename = "Picked Up")]
  PickedUp,
  #[serde(rename = "In Transit")]
  #[sqlx(rename = "In Transit")]
  InTransit,
  #[serde(rename = "Completed")]
  #[sqlx(rename = "Completed")]
  Completed,
  #[serde(rename = "Failed")]
  #[sqlx(rename = "Failed")]
  Failed,
}

impl AssignmentStatus {
  /// Status written onto the order whenever the assignment moves.
  pub fn mirrored_order_status(self) -> OrderStatus {
    match self {
      AssignmentStatus::Assigned => OrderStatus::Assigned,
      AssignmentStatus::PickedUp => OrderStatus::PickedUp,
      AssignmentStatus::InProgress | AssignmentStatus::InTransit => OrderStatus::InTransit,
      AssignmentStatus::Completed => OrderStatus::Completed,
      AssignmentStatus::Failed => OrderStatus::Processing,
    }
  }

  /// Terminal statuses free the agent's slot.
  pub fn is_terminal(self) -> bool {
    matches!(self, AssignmentStatus::Completed | AssignmentStatus::Failed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPriority {
  Low,
  #[default]
  Normal,
  High,
  Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderAssignment {
  pub order_id: String,
  pub delivery_agent_id: String,
  pub assigned_date: DateTime<Utc>,
  pub status: AssignmentStatus,
  pub priority: AssignmentPriority,
  pub notes: Option<String>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
  pub order_id: String,
  pub delivery_agent_id: String,
  pub priority: AssignmentPriority,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentUpdate {
  #[serde(alias = "deliveryAgentId")]
  pub agent_id: Option<String>,
  pub status: Option<AssignmentStatus>,
  pub priority: Option<AssignmentPriority>,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilter {
  pub agent_id: Option<String>,
  pub status: Option<AssignmentStatus>,
}

impl AssignmentFilter {
  pub fn matches(&self, assignment: &OrderAssignment) -> bool {
    self.agent_id.as_deref().map_or(true, |a| assignment.delivery_agent_id == a)
      && self.status.map_or(true, |s| assignment.status == s)
  }
}
