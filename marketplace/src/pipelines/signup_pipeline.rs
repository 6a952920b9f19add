// marketplace/src/pipelines/signup_pipeline.rs

use crate::errors::AppError;
use crate::models::{FarmerStatus, NewUser, UserType};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::SignupCtxData;
use crate::services::auth_service;
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry};
use std::sync::Arc;
use tracing::{event, info, warn, Level};

fn required(value: &Option<String>) -> Option<String> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn signup_pipeline() -> Pipeline<SignupCtxData, AppError> {
  let mut p = Pipeline::<SignupCtxData, AppError>::new(&[
    ("validate_signup_input", false, None),
    ("check_existing_user", false, None),
    ("create_user", false, None),
    ("issue_token", false, None),
  ]);

  p.on_root("validate_signup_input", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (input, allow_admin) = {
        let guard = ctx_data.read();
        (guard.input.clone(), guard.app_state.config.allow_admin_signup)
      };

      if input.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required.".to_string()));
      }
      let email = common_steps::normalize_email(&input.email)?;
      if input.password.chars().count() < auth_service::MIN_PASSWORD_LEN {
        warn!("Password too short for signup.");
        return Err(AppError::Validation(format!(
          "Password must be at least {} characters long.",
          auth_service::MIN_PASSWORD_LEN
        )));
      }

      let user_type = match input.user_type.as_deref() {
        None | Some("") => UserType::Customer,
        Some(raw) => raw.parse::<UserType>().map_err(AppError::Validation)?,
      };
      if user_type == UserType::Admin && !allow_admin {
        return Err(AppError::Validation("Admin accounts cannot be self-registered.".to_string()));
      }
      if user_type == UserType::Farmer && (required(&input.farm_name).is_none() || required(&input.farm_location).is_none()) {
        return Err(AppError::Validation(
          "Farmers must provide a farm name and farm location.".to_string(),
        ));
      }

      {
        let mut guard = ctx_data.write();
        guard.input.email = email;
        guard.input.user_type = Some(user_type.as_str().to_string());
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("check_existing_user", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (email, store) = {
        let guard = ctx_data.read();
        (guard.input.email.clone(), guard.app_state.store.clone())
      };
      if store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "Signup attempted with an existing email.");
        return Err(AppError::Conflict("An account with this email already exists.".to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("create_user", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (input, store) = {
        let guard = ctx_data.read();
        (guard.input.clone(), guard.app_state.store.clone())
      };
      let user_type = input
        .user_type
        .as_deref()
        .unwrap_or("customer")
        .parse::<UserType>()
        .map_err(AppError::Validation)?;
      let password_hash = auth_service::hash_password(&input.password)?;

      let farmer = user_type == UserType::Farmer;
      let new_user = NewUser {
        name: input.name.trim().to_string(),
        email: input.email,
        password_hash,
        user_type,
        phone: required(&input.phone),
        address: required(&input.address),
        farm_name: if farmer { required(&input.farm_name) } else { None },
        farm_location: if farmer { required(&input.farm_location) } else { None },
        farmer_status: farmer.then_some(FarmerStatus::PendingPayment),
      };
      let user = store.create_user(new_user).await?;
      info!(user_id = %user.id, user_type = %user.user_type, "User registered.");
      ctx_data.write().created_user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("issue_token", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let token = {
        let guard = ctx_data.read();
        let user = guard
          .created_user
          .as_ref()
          .ok_or_else(|| AppError::Internal("Signup reached token issue without a user.".to_string()))?;
        common_steps::issue_token(&guard.app_state, user)?
      };
      ctx_data.write().token = Some(token);
      event!(Level::DEBUG, "Signup token issued.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_signup_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  registry.register_pipeline(signup_pipeline());
  tracing::info!("Sign-up pipeline registered.");
}
