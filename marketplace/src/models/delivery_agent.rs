// marketplace/src/models/delivery_agent.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "agent_status")]
pub enum AgentStatus {
  Active,
  Inactive,
  Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAgent {
  pub agent_id: String,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub vehicle_type: Option<String>,
  pub status: AgentStatus,
  pub assigned_orders: i32,
  pub completed_deliveries: i32,
  pub rating: f64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
  pub const INITIAL_RATING: f64 = 5.0;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeliveryAgent {
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub vehicle_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
  pub name: Option<String>,
  pub phone: Option<String>,
  pub vehicle_type: Option<String>,
  pub status: Option<AgentStatus>,
  pub rating: Option<f64>,
}

/// Formats the agent id, e.g. `DA002`.
pub fn agent_id_from_sequence(seq: i64) -> String {
  format!("DA{:03}", seq)
}
