// marketplace/src/web/handlers/assignment_handlers.rs

//! Order-to-agent assignments. The order-level routes in `order_handlers`
//! go through the same functions.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{AssignmentFilter, AssignmentPriority, AssignmentUpdate, Capability, NewAssignment, Order, OrderAssignment};
use crate::pipelines::contexts::AssignmentCtxData;
use crate::state::AppState;
use crate::web::handlers::{created, ok, run_to_completion};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use farmgate_flow::ContextData;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssignPayload {
  #[serde(default)]
  pub order_id: Option<String>,
  #[serde(alias = "agentId")]
  pub delivery_agent_id: String,
  #[serde(default)]
  pub priority: Option<AssignmentPriority>,
  #[serde(default)]
  pub notes: Option<String>,
}

/// Runs the assignment pipeline for `order_id`.
pub(crate) async fn assign_order(
  app_state: &AppState,
  order_id: String,
  payload: AssignPayload,
) -> AppResult<(OrderAssignment, Option<Order>)> {
  let ctx_data = ContextData::new(AssignmentCtxData {
    app_state: app_state.clone(),
    request: NewAssignment {
      order_id,
      delivery_agent_id: payload.delivery_agent_id.trim().to_string(),
      priority: payload.priority.unwrap_or_default(),
      notes: payload.notes,
    },
    assignment: None,
    order: None,
  });
  run_to_completion(app_state, ctx_data.clone(), "assignment").await?;

  let guard = ctx_data.read();
  let assignment = guard
    .assignment
    .clone()
    .ok_or_else(|| AppError::Internal("Assignment workflow completed without an assignment.".to_string()))?;
  Ok((assignment, guard.order.clone()))
}

#[instrument(name = "handler::create_assignment", skip(app_state, caller, req_payload))]
pub async fn create_assignment_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<AssignPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let mut payload = req_payload.into_inner();
  let order_id = payload
    .order_id
    .take()
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| AppError::Validation("orderId is required".to_string()))?;
  let (assignment, order) = assign_order(&app_state, order_id, payload).await?;
  Ok(created(
    "Order assigned successfully",
    json!({ "assignment": assignment, "order": order }),
  ))
}

#[instrument(name = "handler::list_assignments", skip(app_state, caller))]
pub async fn list_assignments_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  query: web::Query<AssignmentFilter>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let assignments = app_state.store.list_assignments(query.into_inner()).await?;
  Ok(ok(
    "Assignments retrieved",
    json!({ "count": assignments.len(), "assignments": assignments }),
  ))
}

#[instrument(name = "handler::get_assignment", skip(app_state, caller), fields(order_id = %path))]
pub async fn get_assignment_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let order_id = path.into_inner();
  let assignment = app_state
    .store
    .find_assignment(&order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No assignment for order {}", order_id)))?;
  Ok(ok("Assignment retrieved", json!({ "assignment": assignment })))
}

pub(crate) async fn update_assignment(app_state: &AppState, order_id: &str, update: AssignmentUpdate) -> AppResult<HttpResponse> {
  let assignment = app_state.store.update_assignment(order_id, update).await?;
  let order = app_state.store.find_order(order_id).await?;
  info!(%order_id, status = ?assignment.status, "Assignment updated.");
  Ok(ok(
    "Assignment updated successfully",
    json!({ "assignment": assignment, "order": order }),
  ))
}

#[instrument(name = "handler::update_assignment", skip(app_state, caller, req_payload), fields(order_id = %path))]
pub async fn update_assignment_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
  req_payload: web::Json<AssignmentUpdate>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  update_assignment(&app_state, &path.into_inner(), req_payload.into_inner()).await
}

pub(crate) async fn delete_assignment(app_state: &AppState, order_id: &str) -> AppResult<HttpResponse> {
  app_state.store.delete_assignment(order_id).await?;
  let order = app_state.store.find_order(order_id).await?;
  info!(%order_id, "Assignment removed.");
  Ok(ok("Order unassigned successfully", json!({ "order": order })))
}

#[instrument(name = "handler::delete_assignment", skip(app_state, caller), fields(order_id = %path))]
pub async fn delete_assignment_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  delete_assignment(&app_state, &path.into_inner()).await
}
