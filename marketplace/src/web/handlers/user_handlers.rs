// marketplace/src/web/handlers/user_handlers.rs

//! Admin account management.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Capability, FarmerStatus, User, UserType};
use crate::state::AppState;
use crate::web::handlers::ok;
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Deserialize, Debug, Default)]
pub struct UserListQuery {
  #[serde(rename = "type")]
  pub user_type: Option<String>,
}

#[instrument(name = "handler::list_users", skip(app_state, caller))]
pub async fn list_users_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  query: web::Query<UserListQuery>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageUsers)?;
  let user_type = match query.user_type.as_deref().filter(|t| !t.trim().is_empty()) {
    Some(raw) => Some(raw.parse::<UserType>().map_err(AppError::Validation)?),
    None => None,
  };
  let users = app_state.store.list_users(user_type).await?;
  Ok(ok("Users retrieved", json!({ "count": users.len(), "users": users })))
}

#[instrument(name = "handler::pending_farmers", skip(app_state, caller))]
pub async fn pending_farmers_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageUsers)?;
  let farmers = app_state.store.list_farmers_by_status(FarmerStatus::PendingReview).await?;
  Ok(ok("Pending farmers retrieved", json!({ "count": farmers.len(), "farmers": farmers })))
}

async fn load_farmer(app_state: &AppState, id: Uuid) -> AppResult<User> {
  let user = app_state
    .store
    .find_user(id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
  if user.user_type != UserType::Farmer {
    return Err(AppError::Validation("The user is not a farmer".to_string()));
  }
  Ok(user)
}

#[instrument(name = "handler::approve_farmer", skip(app_state, caller), fields(target = %path))]
pub async fn approve_farmer_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageUsers)?;
  let farmer = load_farmer(&app_state, path.into_inner()).await?;
  if !farmer.subscription_paid {
    return Err(AppError::Validation(
      "The farmer has not paid the subscription yet".to_string(),
    ));
  }
  let user = app_state.store.set_farmer_status(farmer.id, FarmerStatus::Approved, None).await?;
  info!("Farmer approved.");
  Ok(ok("Farmer approved", json!({ "user": user })))
}

#[instrument(name = "handler::decline_farmer", skip(app_state, caller), fields(target = %path))]
pub async fn decline_farmer_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageUsers)?;
  let farmer = load_farmer(&app_state, path.into_inner()).await?;
  let user = app_state.store.set_farmer_status(farmer.id, FarmerStatus::Declined, None).await?;
  info!("Farmer declined.");
  Ok(ok("Farmer declined", json!({ "user": user })))
}

async fn set_blocked(app_state: &AppState, caller: &AuthenticatedUser, target: Uuid, blocked: bool) -> AppResult<User> {
  caller.require(Capability::ManageUsers)?;
  if blocked && target == caller.id() {
    return Err(AppError::Validation("You cannot block your own account".to_string()));
  }
  Ok(app_state.store.set_user_blocked(target, blocked).await?)
}

#[instrument(name = "handler::block_user", skip(app_state, caller), fields(target = %path))]
pub async fn block_user_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  let user = set_blocked(&app_state, &caller, path.into_inner(), true).await?;
  info!("User blocked.");
  Ok(ok("User blocked", json!({ "user": user })))
}

#[instrument(name = "handler::unblock_user", skip(app_state, caller), fields(target = %path))]
pub async fn unblock_user_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
  let user = set_blocked(&app_state, &caller, path.into_inner(), false).await?;
  info!("User unblocked.");
  Ok(ok("User unblocked", json!({ "user": user })))
}
