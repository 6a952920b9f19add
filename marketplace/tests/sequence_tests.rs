// tests/sequence_tests.rs
mod common;

use common::*;
use farmgate::models::{DeliveryDetails, NewDeliveryAgent, NewOrder};
use farmgate::store::{MarketStore, MemoryStore, ORDER_SEQUENCE};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn empty_order(email: &str) -> NewOrder {
  NewOrder {
    user_id: Uuid::new_v4(),
    email: email.to_string(),
    delivery: DeliveryDetails {
      name: "Sunil".to_string(),
      address: "Galle".to_string(),
      phone: "0770000000".to_string(),
      notes: None,
    },
    ordered_items: Vec::new(),
    total_cents: 0,
  }
}

#[tokio::test]
#[serial]
async fn test_order_ids_increase_sequentially() {
  let state = test_state();
  let mut ids = Vec::new();
  for _ in 0..12 {
    ids.push(state.store.create_order(empty_order("a@b.lk")).await.unwrap().order_id);
  }
  assert_eq!(ids[0], "CBC0001");
  assert_eq!(ids[6], "CBC0007");
  assert_eq!(ids[11], "CBC0012");
  assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
#[serial]
async fn test_agent_ids_increase_sequentially() {
  let state = test_state();
  let mut ids = Vec::new();
  for i in 0..3 {
    let agent = state
      .store
      .create_agent(NewDeliveryAgent {
        name: format!("Rider {}", i),
        email: format!("rider{}@fleet.lk", i),
        phone: None,
        vehicle_type: Some("bike".to_string()),
      })
      .await
      .unwrap();
    ids.push(agent.agent_id);
  }
  assert_eq!(ids, vec!["DA001", "DA002", "DA003"]);
}

#[tokio::test]
#[serial]
async fn test_duplicate_agent_email_does_not_consume_an_id() {
  let state = test_state();
  let new_agent = |email: &str| NewDeliveryAgent {
    name: "Kamal".to_string(),
    email: email.to_string(),
    phone: None,
    vehicle_type: None,
  };
  state.store.create_agent(new_agent("kamal@fleet.lk")).await.unwrap();
  assert!(state.store.create_agent(new_agent("kamal@fleet.lk")).await.is_err());
  let next = state.store.create_agent(new_agent("other@fleet.lk")).await.unwrap();
  assert_eq!(next.agent_id, "DA002");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_order_creation_yields_unique_ids() {
  setup_tracing();
  let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());

  let mut tasks = Vec::new();
  for i in 0..64 {
    let store = store.clone();
    tasks.push(tokio::spawn(async move {
      store
        .create_order(empty_order(&format!("c{}@b.lk", i)))
        .await
        .unwrap()
        .order_id
    }));
  }

  let mut ids = HashSet::new();
  for task in tasks {
    assert!(ids.insert(task.await.unwrap()));
  }
  assert_eq!(ids.len(), 64);
  assert_eq!(store.next_sequence(ORDER_SEQUENCE).await.unwrap(), 65);
}
