// marketplace/src/pipelines/webhook_pipeline.rs

//! Payment notifications from the gateway: verify, classify, settle.
//!
//! Nothing in here fails the HTTP request. Unverifiable or unknown
//! notifications stop the pipeline with an outcome recorded in the context.

use crate::errors::AppError;
use crate::models::{parse_amount_cents, parse_date_time, CartPaymentResult, SubscriptionPayment};
use crate::pipelines::contexts::{NotificationOutcome, NotificationTarget, PaymentNotificationCtxData};
use crate::services::payhere::PaymentPurpose;
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use std::sync::Arc;
use tracing::{info, warn};

fn unless_target(target: NotificationTarget) -> SkipCondition<PaymentNotificationCtxData> {
  Arc::new(move |ctx_data: ContextData<PaymentNotificationCtxData>| ctx_data.read().target != Some(target))
}

pub fn register_webhook_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let mut p = Pipeline::<PaymentNotificationCtxData, AppError>::new(&[
    ("verify_signature", false, None),
    ("classify_notification", false, None),
    ("settle_cart_order", false, Some(unless_target(NotificationTarget::CartOrder))),
    ("settle_subscription", false, Some(unless_target(NotificationTarget::Subscription))),
  ]);

  p.on_root("verify_signature", |ctx_data: ContextData<PaymentNotificationCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      if guard.app_state.verifier.verify(&guard.notification) {
        return Ok::<_, AppError>(PipelineControl::Continue);
      }
      warn!(order_id = %guard.notification.order_id, "Payment notification failed verification; ignoring.");
      guard.outcome = Some(NotificationOutcome::BadSignature);
      Ok(PipelineControl::Stop)
    })
  });

  p.on_root("classify_notification", |ctx_data: ContextData<PaymentNotificationCtxData>| {
    Box::pin(async move {
      let (order_id, purpose, store) = {
        let guard = ctx_data.read();
        (
          guard.notification.order_id.clone(),
          PaymentPurpose::parse(guard.notification.custom_1.as_deref()),
          guard.app_state.store.clone(),
        )
      };

      let is_cart_order = store.find_cart_order(&order_id).await?.is_some();
      let is_subscription = !is_cart_order && store.find_subscription(&order_id).await?.is_some();
      let target = match purpose.map(NotificationTarget::from) {
        Some(NotificationTarget::CartOrder) if is_cart_order => Some(NotificationTarget::CartOrder),
        Some(NotificationTarget::Subscription) if is_subscription => Some(NotificationTarget::Subscription),
        Some(_) => None,
        None if is_cart_order => Some(NotificationTarget::CartOrder),
        None if is_subscription => Some(NotificationTarget::Subscription),
        None => None,
      };

      let mut guard = ctx_data.write();
      match target {
        Some(target) => {
          guard.target = Some(target);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        None => {
          warn!(%order_id, "Payment notification for an unknown order; ignoring.");
          guard.outcome = Some(NotificationOutcome::UnknownOrder);
          Ok(PipelineControl::Stop)
        }
      }
    })
  });

  p.on_root("settle_cart_order", |ctx_data: ContextData<PaymentNotificationCtxData>| {
    Box::pin(async move {
      let (order_id, result, store) = {
        let guard = ctx_data.read();
        let n = &guard.notification;
        let result = CartPaymentResult {
          status_code: n.status_code.clone(),
          payment_id: n.payment_id.clone(),
        };
        (n.order_id.clone(), result, guard.app_state.store.clone())
      };
      let (order, changed) = store.settle_cart_order(&order_id, result).await?;
      info!(%order_id, status = ?order.status, changed, "Cart order settled.");
      ctx_data.write().outcome = Some(NotificationOutcome::CartOrderSettled { changed });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("settle_subscription", |ctx_data: ContextData<PaymentNotificationCtxData>| {
    Box::pin(async move {
      let (subscription_id, payment, store) = {
        let guard = ctx_data.read();
        let n = &guard.notification;
        let payment = SubscriptionPayment {
          status_code: n.status_code.clone(),
          amount_cents: parse_amount_cents(&n.payhere_amount),
          payment_id: n.payment_id.clone(),
          recurring_token: n.recurring_token.clone(),
          next_occurrence: n.next_occurrence_date.as_deref().and_then(parse_date_time),
        };
        (n.order_id.clone(), payment, guard.app_state.store.clone())
      };
      let settlement = store.settle_subscription(&subscription_id, payment).await?;
      info!(
        %subscription_id,
        status = ?settlement.subscription.status,
        attempts = settlement.subscription.renewal_attempts,
        "Subscription notification applied."
      );
      ctx_data.write().outcome = Some(NotificationOutcome::SubscriptionSettled);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  tracing::info!("Payment notification pipeline registered.");
}
