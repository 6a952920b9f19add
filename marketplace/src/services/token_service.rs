// marketplace/src/services/token_service.rs

//! HS256 bearer tokens.

use crate::errors::AppError;
use crate::models::{FarmerStatus, User, UserType};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
  pub sub: Uuid,
  pub email: String,
  pub user_type: UserType,
  pub subscription_paid: bool,
  pub farmer_status: Option<FarmerStatus>,
  pub iat: i64,
  pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
  encoding: EncodingKey,
  decoding: DecodingKey,
  ttl: Duration,
}

impl TokenService {
  pub fn new(secret: &str, ttl_hours: i64) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret.as_bytes()),
      decoding: DecodingKey::from_secret(secret.as_bytes()),
      ttl: Duration::hours(ttl_hours),
    }
  }

  #[instrument(name = "token_service::issue", skip(self, user), fields(user_id = %user.id), err(Display))]
  pub fn issue(&self, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
      sub: user.id,
      email: user.email.clone(),
      user_type: user.user_type,
      subscription_paid: user.subscription_paid,
      farmer_status: user.farmer_status,
      iat: now.timestamp(),
      exp: (now + self.ttl).timestamp(),
    };
    encode(&Header::default(), &claims, &self.encoding)
      .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
  }

  pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
      debug!(error = %e, "Rejected bearer token.");
      AppError::Unauthorized(format!("Invalid token: {}", e))
    })?;
    Ok(data.claims)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn farmer() -> User {
    let now = Utc::now();
    User {
      id: Uuid::new_v4(),
      name: "Nimal".into(),
      email: "nimal@farm.lk".into(),
      password_hash: String::new(),
      user_type: UserType::Farmer,
      is_blocked: false,
      phone: None,
      address: None,
      farm_name: Some("Green Acres".into()),
      farm_location: Some("Kandy".into()),
      subscription_paid: true,
      farmer_status: Some(FarmerStatus::Approved),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn issued_token_decodes_to_user_claims() {
    let tokens = TokenService::new("test-secret", 24);
    let user = farmer();
    let claims = tokens.decode(&tokens.issue(&user).unwrap()).unwrap();
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.user_type, UserType::Farmer);
    assert_eq!(claims.farmer_status, Some(FarmerStatus::Approved));
    assert_eq!(claims.exp - claims.iat, 24 * 3600);
  }

  #[test]
  fn token_signed_with_other_secret_is_rejected() {
    let token = TokenService::new("secret-a", 1).issue(&farmer()).unwrap();
    let err = TokenService::new("secret-b", 1).decode(&token).unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
  }
}
