// marketplace/src/web/handlers/auth_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{FarmerStatus, UserProfileUpdate, UserType};
use crate::pipelines::contexts::{RegistrationInput, SigninCtxData, SignupCtxData};
use crate::state::AppState;
use crate::web::handlers::{created, current_user, ok, run_to_completion};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use farmgate_flow::ContextData;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
  pub email: String,
  pub password: String,
}

#[instrument(
  name = "handler::register",
  skip(app_state, req_payload),
  fields(req_email = %req_payload.email)
)]
pub async fn register_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<RegistrationInput>,
) -> AppResult<HttpResponse> {
  let ctx_data = ContextData::new(SignupCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    created_user: None,
    token: None,
  });
  run_to_completion(&app_state, ctx_data.clone(), "registration").await?;

  let guard = ctx_data.read();
  let user = guard.created_user.clone().ok_or_else(|| {
    warn!("Signup pipeline completed without a user.");
    AppError::Internal("Registration completed without creating a user.".to_string())
  })?;
  let token = guard.token.clone().unwrap_or_default();
  info!(user_id = %user.id, user_type = %user.user_type, "User registered.");

  Ok(created("User registered successfully", json!({ "token": token, "user": user })))
}

#[instrument(
  name = "handler::login",
  skip(app_state, req_payload),
  fields(req_email = %req_payload.email)
)]
pub async fn login_handler(app_state: web::Data<AppState>, req_payload: web::Json<LoginPayload>) -> AppResult<HttpResponse> {
  let LoginPayload { email, password } = req_payload.into_inner();
  let ctx_data = ContextData::new(SigninCtxData {
    app_state: app_state.get_ref().clone(),
    email,
    password,
    user: None,
    token: None,
  });
  run_to_completion(&app_state, ctx_data.clone(), "sign-in").await?;

  let guard = ctx_data.read();
  let (user, token) = match (guard.user.clone(), guard.token.clone()) {
    (Some(user), Some(token)) => (user, token),
    _ => {
      warn!("Signin pipeline completed without a user or token.");
      return Err(AppError::Unauthorized("Sign-in did not complete.".to_string()));
    }
  };

  Ok(ok("Login successful", json!({ "token": token, "user": user })))
}

#[instrument(name = "handler::get_profile", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn get_profile_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let user = current_user(&app_state, &caller).await?;
  Ok(ok("Profile retrieved", json!({ "user": user })))
}

#[instrument(name = "handler::update_profile", skip(app_state, caller, req_payload), fields(user_id = %caller.id()))]
pub async fn update_profile_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<UserProfileUpdate>,
) -> AppResult<HttpResponse> {
  let mut update = req_payload.into_inner();
  if update.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
    return Err(AppError::Validation("Name cannot be empty".to_string()));
  }
  if caller.user_type() != UserType::Farmer {
    update.farm_name = None;
    update.farm_location = None;
  }
  let user = app_state.store.update_user_profile(caller.id(), update).await?;
  let token = app_state.tokens.issue(&user)?;
  info!("Profile updated.");
  Ok(ok("Profile updated successfully", json!({ "token": token, "user": user })))
}

/// Records the farmer's onboarding fee and queues the account for review.
#[instrument(name = "handler::pay_farmer_subscription", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn pay_farmer_subscription_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  if caller.user_type() != UserType::Farmer {
    return Err(AppError::Forbidden("Only farmers pay the seller subscription".to_string()));
  }
  let user = current_user(&app_state, &caller).await?;
  match user.farmer_status {
    Some(FarmerStatus::PendingPayment) | Some(FarmerStatus::Declined) => {}
    other => {
      return Err(AppError::Validation(format!(
        "Subscription cannot be paid while the account is {}",
        other.map_or("without a farmer status", farmer_status_label)
      )))
    }
  }

  let user = app_state
    .store
    .set_farmer_status(user.id, FarmerStatus::PendingReview, Some(true))
    .await?;
  let token = app_state.tokens.issue(&user)?;
  info!("Farmer subscription paid; awaiting review.");
  Ok(ok(
    "Subscription payment recorded. Your account is awaiting admin review.",
    json!({ "token": token, "user": user }),
  ))
}

pub(crate) fn farmer_status_label(status: FarmerStatus) -> &'static str {
  match status {
    FarmerStatus::PendingPayment => "pending payment",
    FarmerStatus::PendingReview => "pending review",
    FarmerStatus::Approved => "approved",
    FarmerStatus::Declined => "declined",
  }
}
