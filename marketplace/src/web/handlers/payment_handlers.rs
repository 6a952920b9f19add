// marketplace/src/web/handlers/payment_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  format_cents, line_total_cents, sum_cents, to_cents, BillingFrequency, MAX_AMOUNT_CENTS, Capability, CartOrderItem, FoodSubscription, NewCartOrder, NewSubscription,
  PaymentNotification, SubscriptionStatus,
};
use crate::pipelines::contexts::{NotificationOutcome, PaymentNotificationCtxData};
use crate::services::payhere::CheckoutPayload;
use crate::state::AppState;
use crate::web::handlers::cart_handlers::load_valid_lines;
use crate::web::handlers::{coerce_number, created, current_user, ok};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use farmgate_flow::{ContextData, PipelineResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
  #[serde(default)]
  pub plan_name: String,
  pub amount: Value,
  pub frequency: BillingFrequency,
}

#[instrument(name = "handler::start_cart_checkout", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn start_cart_checkout_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let user = current_user(&app_state, &caller).await?;
  let lines = load_valid_lines(&app_state, user.id).await?;
  if lines.is_empty() {
    return Err(AppError::Validation("Your cart is empty".to_string()));
  }

  let items: Vec<CartOrderItem> = lines
    .into_iter()
    .map(|(line, product)| CartOrderItem {
      product_id: product.product_id,
      name: product.product_name,
      price_cents: product.price_cents,
      quantity: line.quantity,
    })
    .collect();
  let too_large = || AppError::Validation("Cart total is too large".to_string());
  let line_totals: Vec<i64> = items
    .iter()
    .map(|i| line_total_cents(i.price_cents, i.quantity))
    .collect::<Option<_>>()
    .ok_or_else(too_large)?;
  let amount_cents = sum_cents(line_totals).ok_or_else(too_large)?;
  let description = items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", ");

  let cart_order = app_state
    .store
    .create_cart_order(NewCartOrder {
      order_id: format!("CART-{}", Uuid::new_v4().simple()),
      user_id: user.id,
      items,
      amount_cents,
      currency: app_state.config.payhere.currency.clone(),
    })
    .await?;

  let payload = CheckoutPayload::one_time(
    &app_state.config.payhere,
    &app_state.signer,
    &cart_order.order_id,
    description,
    cart_order.amount_cents,
    &user,
  );
  info!(order_id = %cart_order.order_id, amount_cents, "Cart checkout started.");
  Ok(created(
    "Checkout initiated",
    json!({ "cartOrder": cart_order, "payment": payload }),
  ))
}

#[instrument(name = "handler::start_subscription", skip(app_state, caller, req_payload), fields(user_id = %caller.id()))]
pub async fn start_subscription_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<SubscriptionPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ShopAndOrder)?;
  let SubscriptionPayload {
    plan_name,
    amount,
    frequency,
  } = req_payload.into_inner();
  let plan_name = plan_name.trim().to_string();
  if plan_name.is_empty() {
    return Err(AppError::Validation("planName is required".to_string()));
  }
  let amount_cents = to_cents(coerce_number(&amount, "amount")?)
    .ok_or_else(|| AppError::Validation(format!("amount cannot exceed {}", format_cents(MAX_AMOUNT_CENTS))))?;
  if amount_cents <= 0 {
    return Err(AppError::Validation("amount must be greater than zero".to_string()));
  }

  let user = current_user(&app_state, &caller).await?;
  let subscription = app_state
    .store
    .create_subscription(NewSubscription {
      subscription_id: format!("SUB-{}", Uuid::new_v4().simple()),
      user_id: user.id,
      plan_name: plan_name.clone(),
      amount_cents,
      currency: app_state.config.payhere.currency.clone(),
      frequency,
      max_renewal_attempts: app_state.config.payhere.max_renewal_attempts,
    })
    .await?;

  let payload = CheckoutPayload::recurring(
    &app_state.config.payhere,
    &app_state.signer,
    &subscription.subscription_id,
    plan_name,
    amount_cents,
    frequency,
    &user,
  );
  info!(subscription_id = %subscription.subscription_id, "Subscription started.");
  Ok(created(
    "Subscription initiated",
    json!({ "subscription": subscription, "payment": payload }),
  ))
}

#[instrument(name = "handler::list_subscriptions", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn list_subscriptions_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let owner = if caller.can(Capability::ManageSubscriptions) {
    None
  } else {
    Some(caller.id())
  };
  let subscriptions = app_state.store.list_subscriptions(owner).await?;
  Ok(ok(
    "Subscriptions retrieved",
    json!({ "count": subscriptions.len(), "subscriptions": subscriptions }),
  ))
}

async fn find_own_subscription(app_state: &AppState, caller: &AuthenticatedUser, subscription_id: &str) -> AppResult<FoodSubscription> {
  let subscription = app_state
    .store
    .find_subscription(subscription_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", subscription_id)))?;
  if subscription.user_id != caller.id() && !caller.can(Capability::ManageSubscriptions) {
    return Err(AppError::Forbidden("You do not have access to this subscription".to_string()));
  }
  Ok(subscription)
}

#[instrument(name = "handler::cancel_subscription", skip(app_state, caller), fields(subscription_id = %path))]
pub async fn cancel_subscription_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  let subscription = find_own_subscription(&app_state, &caller, &path.into_inner()).await?;
  if subscription.status == SubscriptionStatus::Cancelled {
    return Err(AppError::Validation("Subscription is already cancelled".to_string()));
  }
  let reason = if subscription.user_id == caller.id() {
    "Cancelled by the subscriber"
  } else {
    "Cancelled by an administrator"
  };
  let subscription = app_state
    .store
    .cancel_subscription(&subscription.subscription_id, reason)
    .await?;
  info!("Subscription cancelled.");
  Ok(ok("Subscription cancelled", json!({ "subscription": subscription })))
}

#[instrument(name = "handler::subscription_logs", skip(app_state, caller), fields(subscription_id = %path))]
pub async fn subscription_logs_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  let subscription = find_own_subscription(&app_state, &caller, &path.into_inner()).await?;
  let logs = app_state.store.subscription_logs(&subscription.subscription_id).await?;
  Ok(ok("Subscription logs retrieved", json!({ "count": logs.len(), "logs": logs })))
}

#[instrument(name = "handler::list_cart_orders", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn list_cart_orders_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let orders = app_state.store.list_cart_orders(caller.id()).await?;
  Ok(ok("Cart orders retrieved", json!({ "count": orders.len(), "cartOrders": orders })))
}

/// The gateway posts form fields; JSON bodies are accepted too.
fn parse_notification(body: &[u8]) -> Option<PaymentNotification> {
  let text = std::str::from_utf8(body).ok()?.trim();
  if text.starts_with('{') {
    return serde_json::from_str(text).ok();
  }
  web::Query::<PaymentNotification>::from_query(text).ok().map(|q| q.into_inner())
}

/// Always acknowledges with 200 so the gateway stops retrying; problems are
/// only logged.
#[instrument(name = "handler::payment_notify", skip(app_state, body), fields(body_len = body.len()))]
pub async fn payment_notify_handler(app_state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
  let acknowledged = |outcome: &str| ok("Notification received", json!({ "outcome": outcome }));

  let Some(notification) = parse_notification(&body) else {
    warn!("Unparseable payment notification; ignoring.");
    return acknowledged("unparseable");
  };
  info!(order_id = %notification.order_id, status_code = %notification.status_code, "Payment notification received.");

  let ctx_data = ContextData::new(PaymentNotificationCtxData {
    app_state: app_state.get_ref().clone(),
    notification,
    target: None,
    outcome: None,
  });
  match app_state.flows.run(ctx_data.clone()).await {
    Ok(PipelineResult::Completed) | Ok(PipelineResult::Stopped) => {
      let outcome = ctx_data.read().outcome.clone();
      acknowledged(outcome_label(outcome.as_ref()))
    }
    Err(err) => {
      error!(error = %err, "Payment notification could not be processed.");
      acknowledged("error")
    }
  }
}

fn outcome_label(outcome: Option<&NotificationOutcome>) -> &'static str {
  match outcome {
    Some(NotificationOutcome::BadSignature) => "ignored",
    Some(NotificationOutcome::UnknownOrder) => "unknown_order",
    Some(NotificationOutcome::CartOrderSettled { changed: true }) => "settled",
    Some(NotificationOutcome::CartOrderSettled { changed: false }) => "already_settled",
    Some(NotificationOutcome::SubscriptionSettled) => "settled",
    None => "received",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn notifications_parse_from_form_and_json() {
    let form = b"merchant_id=121&order_id=CART-1&payhere_amount=1000.00&payhere_currency=LKR&status_code=2&md5sig=AB&custom_1=cart";
    let n = parse_notification(form).unwrap();
    assert_eq!(n.order_id, "CART-1");
    assert_eq!(n.custom_1.as_deref(), Some("cart"));
    assert!(n.payment_id.is_none());

    let json = br#"{"merchant_id":"121","order_id":"SUB-9","status_code":"-2"}"#;
    let n = parse_notification(json).unwrap();
    assert_eq!(n.order_id, "SUB-9");
    assert_eq!(n.status_code, "-2");

    assert!(parse_notification(&[0xff, 0xfe]).is_none());
  }
}
