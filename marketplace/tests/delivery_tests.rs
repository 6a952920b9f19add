// tests/delivery_tests.rs
mod common;

use common::*;
use farmgate::errors::AppError;
use farmgate::models::{
  AgentStatus, AgentUpdate, AssignmentPriority, AssignmentStatus, AssignmentUpdate, DeliveryAgent, DeliveryDetails,
  NewAssignment, NewDeliveryAgent, NewOrder, OrderStatus,
};
use farmgate::pipelines::contexts::AssignmentCtxData;
use farmgate::state::AppState;
use farmgate::store::StoreError;
use farmgate_flow::ContextData;
use serial_test::serial;
use uuid::Uuid;

async fn seed_orders(state: &AppState, count: usize) {
  for _ in 0..count {
    state
      .store
      .create_order(NewOrder {
        user_id: Uuid::new_v4(),
        email: "buyer@example.com".to_string(),
        delivery: DeliveryDetails {
          name: "Buyer".to_string(),
          address: "Matara".to_string(),
          phone: "0711111111".to_string(),
          notes: None,
        },
        ordered_items: Vec::new(),
        total_cents: 1_000,
      })
      .await
      .unwrap();
  }
}

async fn seed_agent(state: &AppState, name: &str) -> DeliveryAgent {
  state
    .store
    .create_agent(NewDeliveryAgent {
      name: name.to_string(),
      email: format!("{}@fleet.lk", name.to_lowercase()),
      phone: None,
      vehicle_type: Some("three-wheeler".to_string()),
    })
    .await
    .unwrap()
}

async fn assign(state: &AppState, order_id: &str, agent_id: &str) -> Result<ContextData<AssignmentCtxData>, AppError> {
  let ctx_data = ContextData::new(AssignmentCtxData {
    app_state: state.clone(),
    request: NewAssignment {
      order_id: order_id.to_string(),
      delivery_agent_id: agent_id.to_string(),
      priority: AssignmentPriority::High,
      notes: None,
    },
    assignment: None,
    order: None,
  });
  state.flows.run(ctx_data.clone()).await?;
  Ok(ctx_data)
}

async fn agent(state: &AppState, agent_id: &str) -> DeliveryAgent {
  state.store.find_agent(agent_id).await.unwrap().unwrap()
}

#[tokio::test]
#[serial]
async fn test_assigning_order_updates_all_three_records() {
  let state = test_state();
  seed_orders(&state, 7).await;
  seed_agent(&state, "Ruwan").await;
  let dilan = seed_agent(&state, "Dilan").await;
  assert_eq!(dilan.agent_id, "DA002");

  let ctx_data = assign(&state, "CBC0007", "DA002").await.unwrap();

  let assignment = ctx_data.read().assignment.clone().unwrap();
  assert_eq!(assignment.status, AssignmentStatus::Assigned);
  assert_eq!(assignment.priority, AssignmentPriority::High);
  assert_eq!(agent(&state, "DA002").await.assigned_orders, 1);

  let order = ctx_data.read().order.clone().unwrap();
  assert_eq!(order.status, OrderStatus::Assigned);
  assert_eq!(order.delivery_agent_id.as_deref(), Some("DA002"));
  assert_eq!(order.assigned_agent.as_deref(), Some("Dilan"));
  assert!(order.assigned_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_assignment_preconditions() {
  let state = test_state();
  seed_orders(&state, 2).await;
  seed_agent(&state, "Ruwan").await;
  let idle = seed_agent(&state, "Idle").await;
  state
    .store
    .update_agent(
      &idle.agent_id,
      AgentUpdate {
        status: Some(AgentStatus::Inactive),
        ..AgentUpdate::default()
      },
    )
    .await
    .unwrap();

  assert!(matches!(assign(&state, "CBC0099", "DA001").await, Err(AppError::NotFound(_))));
  assert!(matches!(assign(&state, "CBC0001", "DA099").await, Err(AppError::NotFound(_))));
  assert!(matches!(assign(&state, "CBC0001", &idle.agent_id).await, Err(AppError::Validation(_))));

  assign(&state, "CBC0001", "DA001").await.unwrap();
  assert!(matches!(assign(&state, "CBC0001", "DA001").await, Err(AppError::Conflict(_))));
  assert_eq!(agent(&state, "DA001").await.assigned_orders, 1);
}

#[tokio::test]
#[serial]
async fn test_status_updates_mirror_onto_order() {
  let state = test_state();
  seed_orders(&state, 1).await;
  seed_agent(&state, "Ruwan").await;
  assign(&state, "CBC0001", "DA001").await.unwrap();

  let set_status = |status| AssignmentUpdate {
    status: Some(status),
    ..AssignmentUpdate::default()
  };

  state.store.update_assignment("CBC0001", set_status(AssignmentStatus::PickedUp)).await.unwrap();
  assert_eq!(state.store.find_order("CBC0001").await.unwrap().unwrap().status, OrderStatus::PickedUp);

  state.store.update_assignment("CBC0001", set_status(AssignmentStatus::InProgress)).await.unwrap();
  assert_eq!(state.store.find_order("CBC0001").await.unwrap().unwrap().status, OrderStatus::InTransit);

  state.store.update_assignment("CBC0001", set_status(AssignmentStatus::Completed)).await.unwrap();
  let order = state.store.find_order("CBC0001").await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Completed);
  let ruwan = agent(&state, "DA001").await;
  assert_eq!((ruwan.assigned_orders, ruwan.completed_deliveries), (0, 1));
}

#[tokio::test]
#[serial]
async fn test_reassignment_moves_the_counter() {
  let state = test_state();
  seed_orders(&state, 1).await;
  seed_agent(&state, "Ruwan").await;
  seed_agent(&state, "Dilan").await;
  assign(&state, "CBC0001", "DA001").await.unwrap();

  let update = AssignmentUpdate {
    agent_id: Some("DA002".to_string()),
    ..AssignmentUpdate::default()
  };
  let assignment = state.store.update_assignment("CBC0001", update).await.unwrap();

  assert_eq!(assignment.delivery_agent_id, "DA002");
  assert_eq!(agent(&state, "DA001").await.assigned_orders, 0);
  assert_eq!(agent(&state, "DA002").await.assigned_orders, 1);
  let order = state.store.find_order("CBC0001").await.unwrap().unwrap();
  assert_eq!(order.assigned_agent.as_deref(), Some("Dilan"));
}

#[tokio::test]
#[serial]
async fn test_unassign_returns_order_to_processing() {
  let state = test_state();
  seed_orders(&state, 1).await;
  seed_agent(&state, "Ruwan").await;
  assign(&state, "CBC0001", "DA001").await.unwrap();

  state.store.delete_assignment("CBC0001").await.unwrap();

  let order = state.store.find_order("CBC0001").await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Processing);
  assert!(order.delivery_agent_id.is_none() && order.assigned_agent.is_none() && order.assigned_at.is_none());
  assert_eq!(agent(&state, "DA001").await.assigned_orders, 0);
  assert!(state.store.find_assignment("CBC0001").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_agent_with_active_work_cannot_be_deleted() {
  let state = test_state();
  seed_orders(&state, 1).await;
  seed_agent(&state, "Ruwan").await;
  assign(&state, "CBC0001", "DA001").await.unwrap();

  let err = state.store.delete_agent("DA001").await.unwrap_err();
  assert!(matches!(err, StoreError::Rejected(_)));

  let done = AssignmentUpdate {
    status: Some(AssignmentStatus::Completed),
    ..AssignmentUpdate::default()
  };
  state.store.update_assignment("CBC0001", done).await.unwrap();
  state.store.delete_agent("DA001").await.unwrap();
  assert!(state.store.find_agent("DA001").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_cancelling_an_assigned_order_releases_the_agent() {
  let state = test_state();
  seed_orders(&state, 1).await;
  seed_agent(&state, "Ruwan").await;
  assign(&state, "CBC0001", "DA001").await.unwrap();

  let order = state.store.cancel_order("CBC0001").await.unwrap();

  assert_eq!(order.status, OrderStatus::Cancelled);
  assert!(order.delivery_agent_id.is_none());
  assert!(state.store.find_assignment("CBC0001").await.unwrap().is_none());
  assert_eq!(agent(&state, "DA001").await.assigned_orders, 0);

  let err = state.store.delete_assignment("CBC0001").await.unwrap_err();
  assert!(matches!(err, StoreError::NotFound { .. }));
  assert!(matches!(assign(&state, "CBC0001", "DA001").await, Err(AppError::Validation(_))));
  assert_eq!(
    state.store.find_order("CBC0001").await.unwrap().unwrap().status,
    OrderStatus::Cancelled
  );

  state.store.delete_agent("DA001").await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_shipped_or_completed_orders_cannot_be_cancelled() {
  let state = test_state();
  seed_orders(&state, 2).await;
  for (order_id, status) in [("CBC0001", OrderStatus::Shipped), ("CBC0002", OrderStatus::Completed)] {
    let update = farmgate::models::OrderUpdate {
      status: Some(status),
      notes: None,
    };
    state.store.update_order(order_id, update).await.unwrap();

    let err = state.store.cancel_order(order_id).await.unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));
    assert_eq!(state.store.find_order(order_id).await.unwrap().unwrap().status, status);
  }
}
