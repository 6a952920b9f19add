// marketplace/src/web/handlers/mod.rs

pub mod agent_handlers;
pub mod assignment_handlers;
pub mod auth_handlers;
pub mod cart_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod product_handlers;
pub mod user_handlers;
pub mod utility_handlers;

use crate::errors::{AppError, Result as AppResult};
use crate::models::User;
use crate::state::AppState;
use crate::web::AuthenticatedUser;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use farmgate_flow::{ContextData, PipelineResult};
use serde_json::{json, Value};

/// `{"success": true, "message": ..}` merged with the fields of `payload`.
pub(crate) fn respond(status: StatusCode, message: &str, payload: Value) -> HttpResponse {
  let mut body = json!({ "success": true, "message": message });
  if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), payload) {
    target.extend(fields);
  }
  HttpResponse::build(status).json(body)
}

pub(crate) fn ok(message: &str, payload: Value) -> HttpResponse {
  respond(StatusCode::OK, message, payload)
}

pub(crate) fn created(message: &str, payload: Value) -> HttpResponse {
  respond(StatusCode::CREATED, message, payload)
}

/// Runs the pipeline registered for `T`, expecting it to finish every step.
pub(crate) async fn run_to_completion<T>(state: &AppState, ctx_data: ContextData<T>, workflow: &str) -> AppResult<()>
where
  T: Send + Sync + 'static,
{
  match state.flows.run(ctx_data).await? {
    PipelineResult::Completed => Ok(()),
    PipelineResult::Stopped => Err(AppError::Internal(format!("The {} workflow was halted unexpectedly.", workflow))),
  }
}

/// The caller's current account record. Tokens can be stale, so checks that
/// depend on account state read it from the store.
pub(crate) async fn current_user(state: &AppState, caller: &AuthenticatedUser) -> AppResult<User> {
  state
    .store
    .find_user(caller.id())
    .await?
    .ok_or_else(|| AppError::Unauthorized("The account for this token no longer exists".to_string()))
}

/// Reads a number that may arrive as a JSON number or a numeric string.
pub(crate) fn coerce_number(value: &Value, field: &str) -> AppResult<f64> {
  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  number
    .filter(|n| n.is_finite())
    .ok_or_else(|| AppError::Validation(format!("{} must be a number", field)))
}

pub(crate) fn coerce_whole(value: &Value, field: &str) -> AppResult<i32> {
  let number = coerce_number(value, field)?;
  if number.fract() != 0.0 || number < f64::from(i32::MIN) || number > f64::from(i32::MAX) {
    return Err(AppError::Validation(format!("{} must be a whole number", field)));
  }
  Ok(number as i32)
}
