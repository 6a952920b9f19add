// marketplace/src/pipelines/assignment_pipeline.rs

use crate::errors::AppError;
use crate::models::AgentStatus;
use crate::pipelines::contexts::AssignmentCtxData;
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry};
use std::sync::Arc;
use tracing::{info, warn};

pub fn register_assignment_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let mut p = Pipeline::<AssignmentCtxData, AppError>::new(&[
    ("check_order_and_agent", false, None),
    ("create_assignment", false, None),
    ("reload_order", true, None),
  ]);

  // Early, readable errors. The store re-checks inside its transaction.
  p.on_root("check_order_and_agent", |ctx_data: ContextData<AssignmentCtxData>| {
    Box::pin(async move {
      let (order_id, agent_id, store) = {
        let guard = ctx_data.read();
        (
          guard.request.order_id.clone(),
          guard.request.delivery_agent_id.clone(),
          guard.app_state.store.clone(),
        )
      };
      if order_id.trim().is_empty() || agent_id.trim().is_empty() {
        return Err(AppError::Validation("orderId and deliveryAgentId are required.".to_string()));
      }
      if store.find_order(&order_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Order {} not found", order_id)));
      }
      let agent = store
        .find_agent(&agent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Delivery agent {} not found", agent_id)))?;
      if agent.status != AgentStatus::Active {
        warn!(%agent_id, status = ?agent.status, "Assignment to an agent that is not active.");
        return Err(AppError::Validation(format!("Delivery agent {} is not active", agent_id)));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("create_assignment", |ctx_data: ContextData<AssignmentCtxData>| {
    Box::pin(async move {
      let (request, store) = {
        let guard = ctx_data.read();
        (guard.request.clone(), guard.app_state.store.clone())
      };
      let assignment = store.create_assignment(request).await?;
      info!(order_id = %assignment.order_id, agent_id = %assignment.delivery_agent_id, "Order assigned.");
      ctx_data.write().assignment = Some(assignment);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("reload_order", |ctx_data: ContextData<AssignmentCtxData>| {
    Box::pin(async move {
      let (order_id, store) = {
        let guard = ctx_data.read();
        (guard.request.order_id.clone(), guard.app_state.store.clone())
      };
      let order = store.find_order(&order_id).await?;
      ctx_data.write().order = order;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  tracing::info!("Assignment pipeline registered.");
}
