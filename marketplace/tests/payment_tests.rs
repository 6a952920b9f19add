// tests/payment_tests.rs
mod common;

use common::*;
use farmgate::models::{
  BillingFrequency, CartOrderItem, CartOrderStatus, NewCartOrder, NewSubscription, PaymentNotification,
  SubscriptionLogAction, SubscriptionStatus,
};
use farmgate::pipelines::contexts::{NotificationOutcome, PaymentNotificationCtxData};
use farmgate::services::NotificationVerifier;
use farmgate::state::AppState;
use farmgate_flow::{ContextData, PipelineResult};
use serial_test::serial;
use std::sync::Arc;
use uuid::Uuid;

async fn notify(state: &AppState, notification: PaymentNotification) -> (PipelineResult, Option<NotificationOutcome>) {
  let ctx_data = ContextData::new(PaymentNotificationCtxData {
    app_state: state.clone(),
    notification,
    target: None,
    outcome: None,
  });
  let result = state.flows.run(ctx_data.clone()).await.unwrap();
  let outcome = ctx_data.read().outcome.clone();
  (result, outcome)
}

async fn pending_cart_order(state: &AppState, amount_cents: i64) -> String {
  let order_id = format!("CART-{}", Uuid::new_v4().simple());
  state
    .store
    .create_cart_order(NewCartOrder {
      order_id: order_id.clone(),
      user_id: Uuid::new_v4(),
      items: vec![CartOrderItem {
        product_id: Uuid::new_v4(),
        name: "Veg box".to_string(),
        price_cents: amount_cents,
        quantity: 1,
      }],
      amount_cents,
      currency: "LKR".to_string(),
    })
    .await
    .unwrap();
  order_id
}

async fn pending_subscription(state: &AppState, amount_cents: i64) -> String {
  let subscription_id = format!("SUB-{}", Uuid::new_v4().simple());
  state
    .store
    .create_subscription(NewSubscription {
      subscription_id: subscription_id.clone(),
      user_id: Uuid::new_v4(),
      plan_name: "Weekly greens".to_string(),
      amount_cents,
      currency: "LKR".to_string(),
      frequency: BillingFrequency::Weekly,
      max_renewal_attempts: state.config.payhere.max_renewal_attempts,
    })
    .await
    .unwrap();
  subscription_id
}

#[tokio::test]
#[serial]
async fn test_verifier_rejects_any_single_field_change() {
  let state = test_state();
  let genuine = signed_notification(&state, "CART-abc", 150_000, "2", "cart");
  assert!(state.verifier.verify(&genuine));

  let mut lower = genuine.clone();
  lower.md5sig = lower.md5sig.to_lowercase();
  assert!(state.verifier.verify(&lower));

  let mutations: [fn(&mut PaymentNotification); 6] = [
    |n: &mut PaymentNotification| n.order_id.push('x'),
    |n: &mut PaymentNotification| n.payhere_amount = "1500.01".to_string(),
    |n: &mut PaymentNotification| n.payhere_currency = "USD".to_string(),
    |n: &mut PaymentNotification| n.status_code = "-2".to_string(),
    |n: &mut PaymentNotification| n.merchant_id = "999".to_string(),
    |n: &mut PaymentNotification| n.md5sig = "00".repeat(16),
  ];
  for mutate in mutations {
    let mut tampered = genuine.clone();
    mutate(&mut tampered);
    assert!(!state.verifier.verify(&tampered), "tampered notification verified: {:?}", tampered);
  }
}

#[tokio::test]
#[serial]
async fn test_successful_cart_payment_completes_once() {
  let state = test_state();
  let order_id = pending_cart_order(&state, 150_000).await;

  let (result, outcome) = notify(&state, signed_notification(&state, &order_id, 150_000, "2", "cart")).await;
  assert_eq!(result, PipelineResult::Completed);
  assert_eq!(outcome, Some(NotificationOutcome::CartOrderSettled { changed: true }));
  let order = state.store.find_cart_order(&order_id).await.unwrap().unwrap();
  assert_eq!(order.status, CartOrderStatus::Completed);
  assert!(order.payment_id.is_some());

  let (_, outcome) = notify(&state, signed_notification(&state, &order_id, 150_000, "-2", "cart")).await;
  assert_eq!(outcome, Some(NotificationOutcome::CartOrderSettled { changed: false }));
  let order = state.store.find_cart_order(&order_id).await.unwrap().unwrap();
  assert_eq!(order.status, CartOrderStatus::Completed);
}

#[tokio::test]
#[serial]
async fn test_failed_cart_payment_marks_order_failed() {
  let state = test_state();
  let order_id = pending_cart_order(&state, 40_000).await;
  notify(&state, signed_notification(&state, &order_id, 40_000, "-2", "cart")).await;
  let order = state.store.find_cart_order(&order_id).await.unwrap().unwrap();
  assert_eq!(order.status, CartOrderStatus::Failed);
}

#[tokio::test]
#[serial]
async fn test_bad_signature_and_unknown_orders_are_ignored() {
  let state = test_state();
  let order_id = pending_cart_order(&state, 40_000).await;

  let mut forged = signed_notification(&state, &order_id, 40_000, "2", "cart");
  forged.md5sig = "DEADBEEF".to_string();
  let (result, outcome) = notify(&state, forged).await;
  assert_eq!(result, PipelineResult::Stopped);
  assert_eq!(outcome, Some(NotificationOutcome::BadSignature));
  let order = state.store.find_cart_order(&order_id).await.unwrap().unwrap();
  assert_eq!(order.status, CartOrderStatus::Pending);

  let (result, outcome) = notify(&state, signed_notification(&state, "CART-nope", 40_000, "2", "cart")).await;
  assert_eq!(result, PipelineResult::Stopped);
  assert_eq!(outcome, Some(NotificationOutcome::UnknownOrder));
}

#[tokio::test]
#[serial]
async fn test_subscription_payment_activates_and_extends() {
  let state = test_state();
  let subscription_id = pending_subscription(&state, 250_000).await;

  let mut first = signed_notification(&state, &subscription_id, 250_000, "2", "subscription");
  first.recurring_token = Some("rtok-1".to_string());
  notify(&state, first).await;

  let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Active);
  assert_eq!(sub.recurring_token.as_deref(), Some("rtok-1"));
  let first_end = sub.current_period_end.unwrap();

  let mut second = signed_notification(&state, &subscription_id, 250_000, "2", "subscription");
  second.next_occurrence_date = Some("2031-01-01".to_string());
  notify(&state, second).await;

  let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
  assert_eq!(sub.current_period_end.unwrap(), first_end + chrono::Duration::days(7));
  assert_eq!(sub.next_billing_date.unwrap().format("%Y-%m-%d").to_string(), "2031-01-01");
  assert_eq!(sub.renewal_history.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_redelivered_subscription_payment_is_applied_once() {
  let state = test_state();
  let subscription_id = pending_subscription(&state, 250_000).await;
  let payment = signed_notification(&state, &subscription_id, 250_000, "2", "subscription");

  notify(&state, payment.clone()).await;
  let first_end = state.store.find_subscription(&subscription_id).await.unwrap().unwrap().current_period_end;

  let (result, _) = notify(&state, payment).await;
  assert_eq!(result, PipelineResult::Completed);
  let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
  assert_eq!(sub.current_period_end, first_end);
  assert_eq!(sub.renewal_history.len(), 1);

  let last = state.store.subscription_logs(&subscription_id).await.unwrap().pop().unwrap();
  assert_eq!(last.action, SubscriptionLogAction::Ignored);
}

#[tokio::test]
#[serial]
async fn test_subscription_cancelled_after_max_failed_renewals() {
  let state = test_state();
  let subscription_id = pending_subscription(&state, 250_000).await;
  notify(&state, signed_notification(&state, &subscription_id, 250_000, "2", "subscription")).await;

  for attempt in 1..=3 {
    notify(&state, signed_notification(&state, &subscription_id, 250_000, "-2", "subscription")).await;
    let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
    assert_eq!(sub.renewal_attempts, attempt);
  }

  let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Cancelled);
  assert!(!sub.auto_renew);
  let period_end = sub.current_period_end;
  let history = sub.renewal_history.len();

  notify(&state, signed_notification(&state, &subscription_id, 250_000, "2", "subscription")).await;
  let sub = state.store.find_subscription(&subscription_id).await.unwrap().unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Cancelled);
  assert_eq!(sub.current_period_end, period_end);
  assert_eq!(sub.renewal_history.len(), history);

  let actions: Vec<_> = state
    .store
    .subscription_logs(&subscription_id)
    .await
    .unwrap()
    .into_iter()
    .map(|l| l.action)
    .collect();
  assert_eq!(
    actions,
    vec![
      SubscriptionLogAction::Created,
      SubscriptionLogAction::PaymentSucceeded,
      SubscriptionLogAction::PaymentFailed,
      SubscriptionLogAction::PaymentFailed,
      SubscriptionLogAction::PaymentFailed,
      SubscriptionLogAction::Cancelled,
      SubscriptionLogAction::Ignored,
    ]
  );
}

struct AcceptEverything;

impl NotificationVerifier for AcceptEverything {
  fn verify(&self, _notification: &PaymentNotification) -> bool {
    true
  }
}

#[tokio::test]
#[serial]
async fn test_verifier_is_replaceable() {
  let state = test_state().with_verifier(Arc::new(AcceptEverything));
  let order_id = pending_cart_order(&state, 10_000).await;
  let mut unsigned = signed_notification(&state, &order_id, 10_000, "2", "cart");
  unsigned.md5sig.clear();

  let (_, outcome) = notify(&state, unsigned).await;
  assert_eq!(outcome, Some(NotificationOutcome::CartOrderSettled { changed: true }));
}
