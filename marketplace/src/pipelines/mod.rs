// marketplace/src/pipelines/mod.rs

//! Defines and registers the workflow pipelines of the marketplace.

use crate::errors::AppError;
use crate::state::AppState;
use farmgate_flow::Registry;
use std::sync::Arc;

pub mod common_steps;
pub mod contexts;

pub mod assignment_pipeline;
pub mod cart_pipeline;
pub mod checkout_pipeline;
pub mod signin_pipeline;
pub mod signup_pipeline;
pub mod webhook_pipeline;

/// Registers every pipeline with `registry`. Called once while building
/// `AppState`.
pub fn register_all_pipelines(registry: &Arc<Registry<AppError>>, app_state: &AppState) {
  tracing::info!("Registering pipelines...");

  signup_pipeline::register_signup_pipeline(registry, app_state);
  signin_pipeline::register_signin_pipeline(registry, app_state);
  cart_pipeline::register_add_to_cart_pipeline(registry, app_state);
  checkout_pipeline::register_checkout_pipeline(registry, app_state);
  assignment_pipeline::register_assignment_pipeline(registry, app_state);
  webhook_pipeline::register_webhook_pipeline(registry, app_state);

  tracing::info!("All application pipelines registered.");
}
