// marketplace/src/pipelines/signin_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::SigninCtxData;
use crate::services::auth_service;
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const BAD_CREDENTIALS: &str = "Invalid email or password.";

pub fn register_signin_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let mut p = Pipeline::<SigninCtxData, AppError>::new(&[
    ("fetch_user_by_email", false, None),
    ("verify_password", false, None),
    ("check_not_blocked", false, None),
    ("issue_token", false, None),
  ]);

  p.on_root("fetch_user_by_email", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (raw_email, store) = {
        let guard = ctx_data.read();
        (guard.email.clone(), guard.app_state.store.clone())
      };
      let email = common_steps::normalize_email(&raw_email).map_err(|_| AppError::Unauthorized(BAD_CREDENTIALS.to_string()))?;
      match store.find_user_by_email(&email).await? {
        Some(user) => {
          ctx_data.write().user = Some(user);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        None => {
          warn!(%email, "Sign-in for unknown email.");
          Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()))
        }
      }
    })
  });

  p.on_root("verify_password", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move { verify_password_step(ctx_data) })
  });

  p.on_root("check_not_blocked", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let blocked = ctx_data.read().user.as_ref().map_or(false, |u| u.is_blocked);
      if blocked {
        warn!("Blocked user attempted to sign in.");
        return Err(AppError::Forbidden("This account has been blocked.".to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("issue_token", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (token, user_id) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("Sign-in reached token issue without a user.".to_string()))?;
        (common_steps::issue_token(&guard.app_state, user)?, user.id)
      };
      ctx_data.write().token = Some(token);
      info!(%user_id, "User signed in.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  tracing::info!("Sign-in pipeline registered.");
}

#[instrument(name = "signin::verify_password", skip(ctx_data), err(Display))]
fn verify_password_step(ctx_data: ContextData<SigninCtxData>) -> Result<PipelineControl, AppError> {
  let guard = ctx_data.read();
  let user = guard
    .user
    .as_ref()
    .ok_or_else(|| AppError::Internal("Password check without a loaded user.".to_string()))?;
  if auth_service::verify_password(&user.password_hash, &guard.password)? {
    Ok(PipelineControl::Continue)
  } else {
    warn!(user_id = %user.id, "Wrong password.");
    Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()))
  }
}
