// marketplace/src/web/handlers/agent_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{AgentStatus, AgentUpdate, AssignmentFilter, Capability, NewDeliveryAgent};
use crate::pipelines::common_steps::normalize_email;
use crate::state::AppState;
use crate::web::handlers::{created, ok};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

#[derive(Deserialize, Debug, Default)]
pub struct AgentListQuery {
  pub status: Option<AgentStatus>,
}

#[instrument(name = "handler::create_agent", skip(app_state, caller, req_payload))]
pub async fn create_agent_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<NewDeliveryAgent>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let mut agent = req_payload.into_inner();
  agent.name = agent.name.trim().to_string();
  if agent.name.is_empty() {
    return Err(AppError::Validation("name and email are required".to_string()));
  }
  agent.email = normalize_email(&agent.email)?;

  let agent = app_state.store.create_agent(agent).await?;
  info!(agent_id = %agent.agent_id, "Delivery agent created.");
  Ok(created("Delivery agent created successfully", json!({ "agent": agent })))
}

#[instrument(name = "handler::list_agents", skip(app_state, caller))]
pub async fn list_agents_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  query: web::Query<AgentListQuery>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let agents = app_state.store.list_agents(query.status).await?;
  Ok(ok("Delivery agents retrieved", json!({ "count": agents.len(), "agents": agents })))
}

#[instrument(name = "handler::get_agent", skip(app_state, caller), fields(agent_id = %path))]
pub async fn get_agent_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let agent_id = path.into_inner();
  let agent = app_state
    .store
    .find_agent(&agent_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Delivery agent {} not found", agent_id)))?;
  Ok(ok("Delivery agent retrieved", json!({ "agent": agent })))
}

#[instrument(name = "handler::update_agent", skip(app_state, caller, req_payload), fields(agent_id = %path))]
pub async fn update_agent_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
  req_payload: web::Json<AgentUpdate>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let update = req_payload.into_inner();
  if let Some(rating) = update.rating {
    if !(0.0..=5.0).contains(&rating) {
      return Err(AppError::Validation("rating must be between 0 and 5".to_string()));
    }
  }
  if update.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
    return Err(AppError::Validation("name cannot be empty".to_string()));
  }
  let agent = app_state.store.update_agent(&path.into_inner(), update).await?;
  info!("Delivery agent updated.");
  Ok(ok("Delivery agent updated successfully", json!({ "agent": agent })))
}

#[instrument(name = "handler::delete_agent", skip(app_state, caller), fields(agent_id = %path))]
pub async fn delete_agent_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let agent_id = path.into_inner();
  app_state.store.delete_agent(&agent_id).await?;
  info!("Delivery agent deleted.");
  Ok(ok("Delivery agent deleted successfully", json!({ "agentId": agent_id })))
}

#[instrument(name = "handler::agent_assignments", skip(app_state, caller), fields(agent_id = %path))]
pub async fn agent_assignments_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let agent_id = path.into_inner();
  if app_state.store.find_agent(&agent_id).await?.is_none() {
    return Err(AppError::NotFound(format!("Delivery agent {} not found", agent_id)));
  }
  let assignments = app_state
    .store
    .list_assignments(AssignmentFilter {
      agent_id: Some(agent_id),
      status: None,
    })
    .await?;
  Ok(ok(
    "Agent assignments retrieved",
    json!({ "count": assignments.len(), "assignments": assignments }),
  ))
}
