// marketplace/src/web/extractors.rs

//! Bearer-token extractors.

use crate::errors::AppError;
use crate::models::{Capability, UserType};
use crate::services::Claims;
use crate::state::AppState;
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

/// The caller, as described by a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub claims: Claims,
}

impl AuthenticatedUser {
  pub fn id(&self) -> Uuid {
    self.claims.sub
  }

  pub fn user_type(&self) -> UserType {
    self.claims.user_type
  }

  pub fn can(&self, capability: Capability) -> bool {
    self.claims.user_type.can(capability)
  }

  /// `Forbidden` unless the caller's role grants `capability`.
  pub fn require(&self, capability: Capability) -> Result<(), AppError> {
    if self.can(capability) {
      Ok(())
    } else {
      Err(AppError::Forbidden(format!(
        "A {} account is not allowed to do this",
        self.claims.user_type
      )))
    }
  }
}

fn bearer_token(req: &HttpRequest) -> Result<Option<&str>, AppError> {
  let Some(value) = req.headers().get(header::AUTHORIZATION) else {
    return Ok(None);
  };
  let value = value
    .to_str()
    .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;
  match value.strip_prefix("Bearer ") {
    Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
    _ => Err(AppError::Unauthorized("Invalid token format".to_string())),
  }
}

fn authenticate(req: &HttpRequest) -> Result<Option<AuthenticatedUser>, AppError> {
  let Some(token) = bearer_token(req)? else {
    return Ok(None);
  };
  let state = req
    .app_data::<web::Data<AppState>>()
    .ok_or_else(|| AppError::Internal("Application state is not configured".to_string()))?;
  let claims = state.tokens.decode(token)?;
  Ok(Some(AuthenticatedUser { claims }))
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(authenticate(req).and_then(|user| {
      user.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))
    }))
  }
}

/// Like `AuthenticatedUser`, but anonymous callers are let through. A token
/// that is present but invalid is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequest for MaybeUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(authenticate(req).map(MaybeUser))
  }
}
