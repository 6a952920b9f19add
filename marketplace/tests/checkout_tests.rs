// tests/checkout_tests.rs
mod common;

use common::*;
use farmgate::errors::AppError;
use farmgate::models::{DeliveryDetails, ItemStatus, User};
use farmgate::pipelines::checkout_pipeline::checkout_pipeline;
use farmgate::pipelines::contexts::{CheckoutCtxData, OrderSource, RequestedLine};
use farmgate::state::AppState;
use farmgate_flow::{ContextData, PipelineControl, PipelineResult};
use serial_test::serial;

fn delivery() -> DeliveryDetails {
  DeliveryDetails {
    name: "Nimal Perera".to_string(),
    address: "4 Lake Drive, Colombo".to_string(),
    phone: "0712223344".to_string(),
    notes: None,
  }
}

async fn checkout(state: &AppState, user: &User, source: OrderSource, lines: Vec<RequestedLine>) -> Result<ContextData<CheckoutCtxData>, AppError> {
  let ctx_data = ContextData::new(CheckoutCtxData::new(state.clone(), user, source, delivery(), lines));
  let result = state.flows.run(ctx_data.clone()).await?;
  assert_eq!(result, PipelineResult::Completed);
  Ok(ctx_data)
}

#[tokio::test]
#[serial]
async fn test_cart_order_snapshots_items_and_empties_cart() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let tomatoes = product(&state, &farmer, "Tomatoes", 25_000, 5).await;

  state.store.add_to_cart(buyer.id, tomatoes.product_id, 3, 5).await.unwrap();
  let ctx_data = checkout(&state, &buyer, OrderSource::Cart, Vec::new()).await.unwrap();

  let order = ctx_data.read().order.clone().unwrap();
  assert_eq!(order.ordered_items.len(), 1);
  let item = &order.ordered_items[0];
  assert_eq!(item.name, "Tomatoes");
  assert_eq!(item.quantity, 3);
  assert_eq!(item.price_cents, 25_000);
  assert_eq!(item.owner, farmer.id);
  assert_eq!(item.status, ItemStatus::Processing);
  assert_eq!(order.total_cents, 75_000);

  assert_eq!(stock_of(&state, tomatoes.product_id).await, 2);
  assert!(state.store.get_cart(buyer.id).await.unwrap().items.is_empty());
  assert!(ctx_data.read().cart_cleared);
}

#[tokio::test]
#[serial]
async fn test_every_cart_line_becomes_an_order_item() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let mut expected = Vec::new();
  for (i, name) in ["Beans", "Okra", "Pumpkin", "Gotukola"].iter().enumerate() {
    let p = product(&state, &farmer, name, 1_000 * (i as i64 + 1), 20).await;
    let qty = i as i32 + 1;
    state.store.add_to_cart(buyer.id, p.product_id, qty, 20).await.unwrap();
    expected.push((p.product_id, p.price_cents, qty));
  }

  let ctx_data = checkout(&state, &buyer, OrderSource::Cart, Vec::new()).await.unwrap();
  let order = ctx_data.read().order.clone().unwrap();

  assert_eq!(order.ordered_items.len(), expected.len());
  for (product_id, price_cents, qty) in expected {
    let item = order.ordered_items.iter().find(|i| i.product_id == product_id).unwrap();
    assert_eq!((item.price_cents, item.quantity), (price_cents, qty));
  }
  assert!(state.store.get_cart(buyer.id).await.unwrap().items.is_empty());
}

#[tokio::test]
#[serial]
async fn test_empty_cart_is_rejected() {
  let state = test_state();
  let buyer = customer(&state).await;
  let err = checkout(&state, &buyer, OrderSource::Cart, Vec::new()).await.err().unwrap();
  assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
#[serial]
async fn test_direct_order_takes_price_from_product_and_leaves_cart() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let honey = product(&state, &farmer, "Honey", 120_000, 4).await;
  let kale = product(&state, &farmer, "Kale", 9_000, 10).await;
  state.store.add_to_cart(buyer.id, kale.product_id, 1, 10).await.unwrap();

  let lines = vec![RequestedLine {
    product_id: honey.product_id,
    quantity: 2,
  }];
  let ctx_data = checkout(&state, &buyer, OrderSource::Direct, lines).await.unwrap();
  let order = ctx_data.read().order.clone().unwrap();

  assert_eq!(order.total_cents, 240_000);
  assert_eq!(stock_of(&state, honey.product_id).await, 2);
  assert_eq!(state.store.get_cart(buyer.id).await.unwrap().items.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_insufficient_stock_leaves_stock_untouched() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let plenty = product(&state, &farmer, "Rice", 5_000, 50).await;
  let scarce = product(&state, &farmer, "Durian", 80_000, 1).await;

  let lines = vec![
    RequestedLine {
      product_id: plenty.product_id,
      quantity: 10,
    },
    RequestedLine {
      product_id: scarce.product_id,
      quantity: 2,
    },
  ];
  let err = checkout(&state, &buyer, OrderSource::Direct, lines).await.err().unwrap();

  assert!(matches!(err, AppError::Validation(_)));
  assert_eq!(stock_of(&state, plenty.product_id).await, 50);
  assert_eq!(stock_of(&state, scarce.product_id).await, 1);
}

#[tokio::test]
#[serial]
async fn test_failed_persist_restores_reserved_stock() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let mangoes = product(&state, &farmer, "Mangoes", 3_000, 8).await;
  let limes = product(&state, &farmer, "Limes", 500, 30).await;
  state.store.add_to_cart(buyer.id, mangoes.product_id, 5, 8).await.unwrap();
  state.store.add_to_cart(buyer.id, limes.product_id, 12, 30).await.unwrap();

  let mut pipeline = checkout_pipeline();
  pipeline.before_root("persist_order", |_ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move { Err::<PipelineControl, _>(AppError::Store("write timed out".to_string())) })
  });
  state.flows.register_pipeline(pipeline);

  let ctx_data = ContextData::new(CheckoutCtxData::new(state.clone(), &buyer, OrderSource::Cart, delivery(), Vec::new()));
  let err = state.flows.run(ctx_data.clone()).await.unwrap_err();

  assert!(matches!(err, AppError::Store(_)));
  assert_eq!(stock_of(&state, mangoes.product_id).await, 8);
  assert_eq!(stock_of(&state, limes.product_id).await, 30);
  assert!(ctx_data.read().reserved.is_empty());
  assert!(ctx_data.read().order.is_none());
  assert_eq!(state.store.get_cart(buyer.id).await.unwrap().items.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_concurrent_orders_never_oversell() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let jackfruit = product(&state, &farmer, "Jackfruit", 2_000, 7).await;

  let mut tasks = Vec::new();
  for _ in 0..10 {
    let state = state.clone();
    let buyer = customer(&state).await;
    let product_id = jackfruit.product_id;
    tasks.push(tokio::spawn(async move {
      let lines = vec![RequestedLine { product_id, quantity: 2 }];
      let ctx_data = ContextData::new(CheckoutCtxData::new(state.clone(), &buyer, OrderSource::Direct, delivery(), lines));
      state.flows.run(ctx_data).await.is_ok()
    }));
  }

  let mut placed = 0;
  for task in tasks {
    if task.await.unwrap() {
      placed += 1;
    }
  }
  let remaining = stock_of(&state, jackfruit.product_id).await;
  assert!(remaining >= 0);
  assert_eq!(placed, 3);
  assert_eq!(remaining, 7 - placed * 2);
}

#[tokio::test]
#[serial]
async fn test_reduce_stock_is_conditional() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let eggs = product(&state, &farmer, "Eggs", 60, 3).await;

  assert!(state.store.reserve_stock(eggs.product_id, 2).await.is_ok());
  assert!(state.store.reserve_stock(eggs.product_id, 2).await.is_err());
  assert_eq!(stock_of(&state, eggs.product_id).await, 1);
}

#[tokio::test]
#[serial]
async fn test_order_total_overflow_is_rejected_before_reserving() {
  let state = test_state();
  let farmer = approved_farmer(&state).await;
  let buyer = customer(&state).await;
  let truffle = product(&state, &farmer, "Truffle", i64::MAX / 2, 5).await;

  let lines = vec![RequestedLine {
    product_id: truffle.product_id,
    quantity: 3,
  }];
  let err = checkout(&state, &buyer, OrderSource::Direct, lines).await.err().unwrap();

  assert!(matches!(err, AppError::Validation(_)));
  assert_eq!(stock_of(&state, truffle.product_id).await, 5);
  assert!(state.store.list_orders(None).await.unwrap().is_empty());
}
