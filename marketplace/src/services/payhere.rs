// marketplace/src/services/payhere.rs

//! PayHere hosted-checkout signing and payment-notification verification.
//!
//! Both directions use the same digest:
//! `upper(md5(merchant_id ++ order_id ++ amount ++ currency [++ status_code] ++ upper(md5(secret))))`
//! with the amount rendered to exactly two decimals.

use crate::config::PayHereConfig;
use crate::models::{format_cents, parse_amount_cents, BillingFrequency, PaymentNotification, User};
use md5::{Digest, Md5};
use serde::Serialize;
use tracing::{debug, warn};

pub fn md5_upper(input: &str) -> String {
  hex::encode_upper(Md5::digest(input.as_bytes()))
}

/// What a checkout pays for, carried through the gateway in `custom_1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPurpose {
  Cart,
  Subscription,
}

impl PaymentPurpose {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentPurpose::Cart => "cart",
      PaymentPurpose::Subscription => "subscription",
    }
  }

  pub fn parse(raw: Option<&str>) -> Option<Self> {
    match raw.map(str::trim) {
      Some("cart") => Some(PaymentPurpose::Cart),
      Some("subscription") => Some(PaymentPurpose::Subscription),
      _ => None,
    }
  }
}

#[derive(Clone)]
pub struct PayHereSigner {
  merchant_id: String,
  secret_digest: String,
}

impl PayHereSigner {
  pub fn new(config: &PayHereConfig) -> Self {
    Self {
      merchant_id: config.merchant_id.clone(),
      secret_digest: md5_upper(&config.merchant_secret),
    }
  }

  pub fn merchant_id(&self) -> &str {
    &self.merchant_id
  }

  fn sign(&self, order_id: &str, amount_cents: i64, currency: &str) -> String {
    md5_upper(&format!(
      "{}{}{}{}{}",
      self.merchant_id,
      order_id,
      format_cents(amount_cents),
      currency,
      self.secret_digest
    ))
  }

  /// Hash for a one-time checkout.
  pub fn checkout_hash(&self, order_id: &str, amount_cents: i64, currency: &str) -> String {
    self.sign(order_id, amount_cents, currency)
  }

  /// Hash for a recurring checkout. The gateway uses the one-time formula.
  pub fn recurring_hash(&self, order_id: &str, amount_cents: i64, currency: &str) -> String {
    self.sign(order_id, amount_cents, currency)
  }

  /// The `md5sig` the gateway sends with a notification for these values.
  pub fn notification_signature(&self, order_id: &str, amount_cents: i64, currency: &str, status_code: &str) -> String {
    md5_upper(&format!(
      "{}{}{}{}{}{}",
      self.merchant_id,
      order_id,
      format_cents(amount_cents),
      currency,
      status_code,
      self.secret_digest
    ))
  }
}

/// Decides whether a payment notification really comes from the gateway.
pub trait NotificationVerifier: Send + Sync {
  fn verify(&self, notification: &PaymentNotification) -> bool;
}

/// Recomputes `md5sig` from the notification fields and the merchant secret.
pub struct Md5SignatureVerifier {
  signer: PayHereSigner,
}

impl Md5SignatureVerifier {
  pub fn new(signer: PayHereSigner) -> Self {
    Self { signer }
  }
}

impl NotificationVerifier for Md5SignatureVerifier {
  fn verify(&self, n: &PaymentNotification) -> bool {
    if n.merchant_id != self.signer.merchant_id() {
      warn!(merchant_id = %n.merchant_id, "Notification for a different merchant.");
      return false;
    }
    let Some(amount_cents) = parse_amount_cents(&n.payhere_amount) else {
      warn!(amount = %n.payhere_amount, "Notification amount is not a number.");
      return false;
    };
    let expected = self
      .signer
      .notification_signature(&n.order_id, amount_cents, &n.payhere_currency, &n.status_code);
    let ok = expected.eq_ignore_ascii_case(n.md5sig.trim());
    debug!(order_id = %n.order_id, verified = ok, "Checked notification signature.");
    ok
  }
}

/// Buyer fields shown on the hosted checkout page.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub phone: String,
  pub address: String,
  pub city: String,
  pub country: String,
}

impl CustomerDetails {
  pub fn from_user(user: &User) -> Self {
    let mut names = user.name.trim().splitn(2, ' ');
    let first_name = names.next().unwrap_or_default().to_string();
    let last_name = names.next().unwrap_or_default().trim().to_string();
    Self {
      first_name,
      last_name,
      email: user.email.clone(),
      phone: user.phone.clone().unwrap_or_default(),
      address: user.address.clone().unwrap_or_default(),
      city: String::new(),
      country: "Sri Lanka".to_string(),
    }
  }
}

/// Form fields the client posts to the hosted checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPayload {
  pub checkout_url: String,
  pub merchant_id: String,
  pub return_url: String,
  pub cancel_url: String,
  pub notify_url: String,
  pub order_id: String,
  pub items: String,
  pub currency: String,
  pub amount: String,
  #[serde(flatten)]
  pub customer: CustomerDetails,
  pub custom_1: String,
  pub custom_2: String,
  pub hash: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub recurrence: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<String>,
}

impl CheckoutPayload {
  fn base(
    config: &PayHereConfig,
    order_id: &str,
    items: String,
    amount_cents: i64,
    purpose: PaymentPurpose,
    user: &User,
    hash: String,
  ) -> Self {
    Self {
      checkout_url: config.mode.checkout_url().to_string(),
      merchant_id: config.merchant_id.clone(),
      return_url: config.return_url.clone(),
      cancel_url: config.cancel_url.clone(),
      notify_url: config.notify_url.clone(),
      order_id: order_id.to_string(),
      items,
      currency: config.currency.clone(),
      amount: format_cents(amount_cents),
      customer: CustomerDetails::from_user(user),
      custom_1: purpose.as_str().to_string(),
      custom_2: user.id.to_string(),
      hash,
      recurrence: None,
      duration: None,
    }
  }

  pub fn one_time(config: &PayHereConfig, signer: &PayHereSigner, order_id: &str, items: String, amount_cents: i64, user: &User) -> Self {
    let hash = signer.checkout_hash(order_id, amount_cents, &config.currency);
    Self::base(
      config,
      order_id,
      items,
      amount_cents,
      PaymentPurpose::Cart,
      user,
      hash,
    )
  }

  pub fn recurring(
    config: &PayHereConfig,
    signer: &PayHereSigner,
    subscription_id: &str,
    plan_name: String,
    amount_cents: i64,
    frequency: BillingFrequency,
    user: &User,
  ) -> Self {
    let hash = signer.recurring_hash(subscription_id, amount_cents, &config.currency);
    let mut payload = Self::base(
      config,
      subscription_id,
      plan_name,
      amount_cents,
      PaymentPurpose::Subscription,
      user,
      hash,
    );
    payload.recurrence = Some(frequency.recurrence().to_string());
    payload.duration = Some("Forever".to_string());
    payload
  }
}
