// marketplace/src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserType {
  Admin,
  Farmer,
  Customer,
}

impl UserType {
  pub fn as_str(self) -> &'static str {
    match self {
      UserType::Admin => "admin",
      UserType::Farmer => "farmer",
      UserType::Customer => "customer",
    }
  }

  /// The single access-policy table. Every role check in the web layer goes
  /// through here.
  pub fn can(self, capability: Capability) -> bool {
    use Capability::*;
    match self {
      UserType::Admin => matches!(
        capability,
        ManageUsers | ManageAnyProduct | ViewAllOrders | ManageOrders | ManageDelivery | ManageSubscriptions
      ),
      UserType::Farmer => matches!(capability, ManageOwnProducts | FulfilOwnItems),
      UserType::Customer => matches!(capability, ShopAndOrder | ViewOwnOrders),
    }
  }
}

impl fmt::Display for UserType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UserType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "admin" => Ok(UserType::Admin),
      "farmer" => Ok(UserType::Farmer),
      "customer" => Ok(UserType::Customer),
      other => Err(format!("Unknown user type '{}'", other)),
    }
  }
}

/// Things a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
  ManageUsers,
  ManageAnyProduct,
  ManageOwnProducts,
  ShopAndOrder,
  ViewAllOrders,
  ManageOrders,
  ViewOwnOrders,
  FulfilOwnItems,
  ManageDelivery,
  ManageSubscriptions,
}

/// Farmer onboarding state. Non-farmers carry no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "farmer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FarmerStatus {
  PendingPayment,
  PendingReview,
  Approved,
  Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  #[serde(skip_serializing)]
  pub password_hash: String,
  pub user_type: UserType,
  pub is_blocked: bool,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub farm_name: Option<String>,
  pub farm_location: Option<String>,
  pub subscription_paid: bool,
  pub farmer_status: Option<FarmerStatus>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl User {
  /// Farmers may list products only once they have paid and been approved.
  pub fn can_sell(&self) -> bool {
    self.user_type == UserType::Farmer && self.subscription_paid && self.farmer_status == Some(FarmerStatus::Approved)
  }
}

#[derive(Debug, Clone)]
pub struct NewUser {
  pub name: String,
  pub email: String,
  pub password_hash: String,
  pub user_type: UserType,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub farm_name: Option<String>,
  pub farm_location: Option<String>,
  pub farmer_status: Option<FarmerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileUpdate {
  pub name: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub farm_name: Option<String>,
  pub farm_location: Option<String>,
}
