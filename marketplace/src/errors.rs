// marketplace/src/errors.rs

use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use farmgate_flow::FlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Validation(String),

  /// Missing or invalid token, or bad credentials.
  #[error("{0}")]
  Unauthorized(String),

  /// Authenticated but not allowed: wrong role, not the owner, blocked.
  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Storage Error: {0}")]
  Store(String),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Short machine-readable kind placed in the `error` field of the envelope.
  pub fn kind(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation",
      AppError::Unauthorized(_) => "unauthorized",
      AppError::Forbidden(_) => "forbidden",
      AppError::NotFound(_) => "not_found",
      AppError::Conflict(_) => "conflict",
      AppError::Config(_) => "config",
      AppError::Store(_) => "store",
      AppError::Workflow { .. } => "workflow",
      AppError::Internal(_) => "internal",
    }
  }
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
      StoreError::Conflict(m) => AppError::Conflict(m),
      StoreError::InsufficientStock { .. } => AppError::Validation(err.to_string()),
      StoreError::Rejected(m) => AppError::Validation(m),
      StoreError::Sqlx(_) | StoreError::Migrate(_) => AppError::Store(err.to_string()),
    }
  }
}

// Handlers that work with anyhow::Result can still use `?`; a wrapped
// AppError or StoreError keeps its status code.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<AppError>() {
      Ok(app_err) => return app_err,
      Err(other) => other,
    };
    let err = match err.downcast::<StoreError>() {
      Ok(store_err) => return AppError::from(store_err),
      Err(other) => other,
    };
    match err.downcast::<FlowError>() {
      Ok(flow_err) => AppError::from(flow_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Config(_) | AppError::Store(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::debug!(application_error = %self, "Responding with client error");
    }
    HttpResponse::build(status).json(json!({
      "success": false,
      "message": self.to_string(),
      "error": self.kind(),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
