// marketplace/src/models/payment.rs

//! Hosted-payment records: one-time cart orders, recurring food
//! subscriptions and the append-only subscription log. The settlement rules
//! applied when the gateway reports a payment live here so that every store
//! implementation applies them identically.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Gateway status code for a successful charge.
pub const STATUS_CODE_SUCCESS: &str = "2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cart_order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CartOrderStatus {
  Pending,
  Completed,
  Failed,
  Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartOrderItem {
  pub product_id: Uuid,
  pub name: String,
  pub price_cents: i64,
  pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartOrder {
  pub order_id: String,
  pub user_id: Uuid,
  pub items: Vec<CartOrderItem>,
  pub amount_cents: i64,
  pub currency: String,
  pub status: CartOrderStatus,
  pub payment_id: Option<String>,
  pub status_code: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CartPaymentResult {
  pub status_code: String,
  pub payment_id: Option<String>,
}

impl CartPaymentResult {
  pub fn is_success(&self) -> bool {
    self.status_code.trim() == STATUS_CODE_SUCCESS
  }
}

impl CartOrder {
  /// Applies a gateway result. Returns `false` when the order was already
  /// settled, in which case nothing changes.
  pub fn settle(&mut self, result: &CartPaymentResult, now: DateTime<Utc>) -> bool {
    if self.status != CartOrderStatus::Pending {
      return false;
    }
    self.status = if result.is_success() {
      CartOrderStatus::Completed
    } else {
      CartOrderStatus::Failed
    };
    self.payment_id = result.payment_id.clone();
    self.status_code = Some(result.status_code.clone());
    self.updated_at = now;
    true
  }
}

#[derive(Debug, Clone)]
pub struct NewCartOrder {
  pub order_id: String,
  pub user_id: Uuid,
  pub items: Vec<CartOrderItem>,
  pub amount_cents: i64,
  pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Pending,
  Active,
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingFrequency {
  Weekly,
  Monthly,
}

impl BillingFrequency {
  /// Gateway recurrence string.
  pub fn recurrence(self) -> &'static str {
    match self {
      BillingFrequency::Weekly => "1 Week",
      BillingFrequency::Monthly => "1 Month",
    }
  }

  /// End of one billing period starting at `from`. Monthly periods use
  /// calendar months, clamped to the last day of shorter months.
  pub fn advance(self, from: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      BillingFrequency::Weekly => from + Duration::days(7),
      BillingFrequency::Monthly => from.checked_add_months(Months::new(1)).unwrap_or(from + Duration::days(30)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalOutcome {
  Succeeded,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalRecord {
  pub at: DateTime<Utc>,
  pub amount_cents: i64,
  pub outcome: RenewalOutcome,
  pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodSubscription {
  pub subscription_id: String,
  pub user_id: Uuid,
  pub plan_name: String,
  pub amount_cents: i64,
  pub currency: String,
  pub frequency: BillingFrequency,
  pub status: SubscriptionStatus,
  pub auto_renew: bool,
  pub renewal_attempts: i32,
  pub max_renewal_attempts: i32,
  pub current_period_end: Option<DateTime<Utc>>,
  pub next_billing_date: Option<DateTime<Utc>>,
  pub recurring_token: Option<String>,
  pub renewal_history: Vec<RenewalRecord>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub subscription_id: String,
  pub user_id: Uuid,
  pub plan_name: String,
  pub amount_cents: i64,
  pub currency: String,
  pub frequency: BillingFrequency,
  pub max_renewal_attempts: i32,
}

/// A charge reported by the gateway against a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionPayment {
  pub status_code: String,
  pub amount_cents: Option<i64>,
  pub payment_id: Option<String>,
  pub recurring_token: Option<String>,
  pub next_occurrence: Option<DateTime<Utc>>,
}

impl SubscriptionPayment {
  pub fn is_success(&self) -> bool {
    self.status_code.trim() == STATUS_CODE_SUCCESS
  }
}

/// Result of settling one notification against a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSettlement {
  pub subscription: FoodSubscription,
  pub logs: Vec<FoodSubscriptionLog>,
}

impl FoodSubscription {
  fn already_settled(&self, payment_id: Option<&str>) -> bool {
    payment_id.map_or(false, |id| {
      self
        .renewal_history
        .iter()
        .any(|r| r.outcome == RenewalOutcome::Succeeded && r.payment_id.as_deref() == Some(id))
    })
  }

  pub fn cancel(&mut self, now: DateTime<Utc>) {
    self.status = SubscriptionStatus::Cancelled;
    self.auto_renew = false;
    self.updated_at = now;
  }

  /// Applies a gateway charge and returns the log entries it produced.
  ///
  /// A cancelled subscription is never billed or extended again, and a
  /// payment id that already settled successfully is not applied twice.
  /// Both cases are only logged as `ignored`.
  pub fn apply_payment(&mut self, payment: &SubscriptionPayment, now: DateTime<Utc>) -> Vec<FoodSubscriptionLog> {
    let amount = payment.amount_cents.unwrap_or(self.amount_cents);
    let log = |action, message: String| {
      FoodSubscriptionLog::new(
        &self.subscription_id,
        action,
        Some(payment.status_code.clone()),
        Some(amount),
        message,
        now,
      )
    };

    if self.status == SubscriptionStatus::Cancelled {
      return vec![log(
        SubscriptionLogAction::Ignored,
        "Notification received for a cancelled subscription".to_string(),
      )];
    }

    if self.already_settled(payment.payment_id.as_deref()) {
      return vec![log(
        SubscriptionLogAction::Ignored,
        format!(
          "Payment {} was already applied",
          payment.payment_id.as_deref().unwrap_or_default()
        ),
      )];
    }

    if payment.is_success() {
      let base = self.current_period_end.map_or(now, |end| end.max(now));
      let period_end = self.frequency.advance(base);
      self.status = SubscriptionStatus::Active;
      self.current_period_end = Some(period_end);
      self.next_billing_date = Some(payment.next_occurrence.unwrap_or(period_end));
      if let Some(token) = &payment.recurring_token {
        self.recurring_token = Some(token.clone());
      }
      self.renewal_attempts = 0;
      self.renewal_history.push(RenewalRecord {
        at: now,
        amount_cents: amount,
        outcome: RenewalOutcome::Succeeded,
        payment_id: payment.payment_id.clone(),
      });
      self.updated_at = now;
      let entry = log(
        SubscriptionLogAction::PaymentSucceeded,
        format!("Payment received; active until {}", period_end.to_rfc3339()),
      );
      return vec![entry];
    }

    self.renewal_attempts += 1;
    self.renewal_history.push(RenewalRecord {
      at: now,
      amount_cents: amount,
      outcome: RenewalOutcome::Failed,
      payment_id: payment.payment_id.clone(),
    });
    self.updated_at = now;
    let mut logs = vec![log(
      SubscriptionLogAction::PaymentFailed,
      format!(
        "Payment failed (attempt {} of {})",
        self.renewal_attempts, self.max_renewal_attempts
      ),
    )];
    if self.renewal_attempts >= self.max_renewal_attempts {
      self.cancel(now);
      logs.push(FoodSubscriptionLog::new(
        &self.subscription_id,
        SubscriptionLogAction::Cancelled,
        Some(payment.status_code.clone()),
        None,
        "Cancelled after reaching the renewal attempt limit".to_string(),
        now,
      ));
    }
    logs
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_log_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionLogAction {
  Created,
  PaymentSucceeded,
  PaymentFailed,
  Cancelled,
  Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FoodSubscriptionLog {
  pub id: Uuid,
  pub subscription_id: String,
  pub action: SubscriptionLogAction,
  pub status_code: Option<String>,
  pub amount_cents: Option<i64>,
  pub message: String,
  pub created_at: DateTime<Utc>,
}

impl FoodSubscriptionLog {
  pub fn new(
    subscription_id: &str,
    action: SubscriptionLogAction,
    status_code: Option<String>,
    amount_cents: Option<i64>,
    message: String,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      subscription_id: subscription_id.to_string(),
      action,
      status_code,
      amount_cents,
      message,
      created_at: now,
    }
  }
}

/// Payment-notification fields posted by the gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentNotification {
  pub merchant_id: String,
  pub order_id: String,
  pub payhere_amount: String,
  pub payhere_currency: String,
  pub status_code: String,
  pub md5sig: String,
  pub custom_1: Option<String>,
  pub custom_2: Option<String>,
  pub payment_id: Option<String>,
  pub recurring_token: Option<String>,
  pub next_occurrence_date: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn subscription(max_attempts: i32) -> FoodSubscription {
    let now = Utc::now();
    FoodSubscription {
      subscription_id: "SUB-1".to_string(),
      user_id: Uuid::new_v4(),
      plan_name: "Veg box".to_string(),
      amount_cents: 250_000,
      currency: "LKR".to_string(),
      frequency: BillingFrequency::Weekly,
      status: SubscriptionStatus::Pending,
      auto_renew: true,
      renewal_attempts: 0,
      max_renewal_attempts: max_attempts,
      current_period_end: None,
      next_billing_date: None,
      recurring_token: None,
      renewal_history: Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  fn charge(code: &str) -> SubscriptionPayment {
    SubscriptionPayment {
      status_code: code.to_string(),
      amount_cents: Some(250_000),
      payment_id: Some("320025".to_string()),
      recurring_token: Some("tok".to_string()),
      next_occurrence: None,
    }
  }

  #[test]
  fn success_extends_from_later_of_now_and_period_end() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let mut sub = subscription(3);
    sub.current_period_end = Some(Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap());

    let logs = sub.apply_payment(&charge("2"), now);

    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.current_period_end, Some(Utc.with_ymd_and_hms(2024, 1, 19, 0, 0, 0).unwrap()));
    assert_eq!(sub.next_billing_date, sub.current_period_end);
    assert_eq!(sub.recurring_token.as_deref(), Some("tok"));
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, SubscriptionLogAction::PaymentSucceeded);
  }

  #[test]
  fn monthly_uses_calendar_months() {
    let jan31 = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
    assert_eq!(
      BillingFrequency::Monthly.advance(jan31),
      Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
    );
  }

  #[test]
  fn repeated_failures_cancel_then_ignore() {
    let now = Utc::now();
    let mut sub = subscription(2);
    sub.apply_payment(&charge("-2"), now);
    assert_eq!(sub.status, SubscriptionStatus::Pending);

    let logs = sub.apply_payment(&charge("-2"), now);
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert!(!sub.auto_renew);
    let actions: Vec<_> = logs.iter().map(|l| l.action).collect();
    assert_eq!(actions, vec![SubscriptionLogAction::PaymentFailed, SubscriptionLogAction::Cancelled]);

    let period_end = sub.current_period_end;
    let logs = sub.apply_payment(&charge("2"), now);
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert_eq!(sub.current_period_end, period_end);
    assert_eq!(logs[0].action, SubscriptionLogAction::Ignored);
  }

  #[test]
  fn redelivered_success_extends_only_once() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut sub = subscription(3);
    sub.apply_payment(&charge("2"), now);
    let period_end = sub.current_period_end;

    let logs = sub.apply_payment(&charge("2"), now);
    assert_eq!(sub.current_period_end, period_end);
    assert_eq!(sub.renewal_history.len(), 1);
    assert_eq!(logs[0].action, SubscriptionLogAction::Ignored);

    let mut next = charge("2");
    next.payment_id = Some("320026".to_string());
    sub.apply_payment(&next, now);
    assert_eq!(sub.current_period_end, period_end.map(|end| BillingFrequency::Weekly.advance(end)));
  }

  #[test]
  fn cart_order_settles_once() {
    let now = Utc::now();
    let mut order = CartOrder {
      order_id: "CART-1".to_string(),
      user_id: Uuid::new_v4(),
      items: Vec::new(),
      amount_cents: 1000,
      currency: "LKR".to_string(),
      status: CartOrderStatus::Pending,
      payment_id: None,
      status_code: None,
      created_at: now,
      updated_at: now,
    };
    let ok = CartPaymentResult {
      status_code: "2".to_string(),
      payment_id: Some("p1".to_string()),
    };
    assert!(order.settle(&ok, now));
    assert_eq!(order.status, CartOrderStatus::Completed);

    let failed = CartPaymentResult {
      status_code: "-2".to_string(),
      payment_id: None,
    };
    assert!(!order.settle(&failed, now));
    assert_eq!(order.status, CartOrderStatus::Completed);
    assert_eq!(order.payment_id.as_deref(), Some("p1"));
  }
}
