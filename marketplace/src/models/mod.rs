// marketplace/src/models/mod.rs

//! Records persisted by the `MarketStore` and the enums that classify them.
//!
//! Money is held as integer minor units (`*_cents`). Request payloads carry
//! decimal amounts and are converted with [`to_cents`].

pub mod assignment;
pub mod cart;
pub mod delivery_agent;
pub mod order;
pub mod payment;
pub mod product;
pub mod user;

pub use assignment::{AssignmentFilter, AssignmentPriority, AssignmentStatus, AssignmentUpdate, NewAssignment, OrderAssignment};
pub use cart::{Cart, CartLine};
pub use delivery_agent::{AgentStatus, AgentUpdate, DeliveryAgent, NewDeliveryAgent};
pub use order::{DeliveryDetails, ItemStatus, NewOrder, Order, OrderItem, OrderStatus, OrderUpdate};
pub use payment::{
  BillingFrequency, CartOrder, CartOrderItem, CartOrderStatus, CartPaymentResult, FoodSubscription, FoodSubscriptionLog,
  NewCartOrder, NewSubscription, PaymentNotification, RenewalOutcome, RenewalRecord, SubscriptionLogAction,
  SubscriptionPayment, SubscriptionSettlement, SubscriptionStatus,
};
pub use product::{NewProduct, Product, ProductFilter, ProductUpdate};
use chrono::{DateTime, NaiveDate, Utc};

pub use user::{Capability, FarmerStatus, NewUser, User, UserProfileUpdate, UserType};

/// Largest amount, in minor units, accepted for a single price or payment.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_00;

/// Largest stock level a product may carry.
pub const MAX_STOCK: i32 = 1_000_000;

/// Converts a decimal amount to minor units, rounding half away from zero.
/// Non-finite amounts and amounts beyond [`MAX_AMOUNT_CENTS`] yield `None`.
pub fn to_cents(amount: f64) -> Option<i64> {
  if !amount.is_finite() {
    return None;
  }
  let cents = (amount * 100.0).round();
  if cents.abs() > MAX_AMOUNT_CENTS as f64 {
    return None;
  }
  Some(cents as i64)
}

/// `price_cents * quantity`, or `None` on overflow.
pub fn line_total_cents(price_cents: i64, quantity: i32) -> Option<i64> {
  price_cents.checked_mul(i64::from(quantity))
}

/// Sums line totals, or `None` on overflow.
pub fn sum_cents<I: IntoIterator<Item = i64>>(amounts: I) -> Option<i64> {
  amounts.into_iter().try_fold(0_i64, |acc, cents| acc.checked_add(cents))
}

/// Renders minor units with exactly two decimals, e.g. `1250` → `"12.50"`.
pub fn format_cents(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses a decimal string such as `"12.5"` or `"1000.00"` into minor units.
pub fn parse_amount_cents(raw: &str) -> Option<i64> {
  let value: f64 = raw.trim().parse().ok()?;
  to_cents(value)
}

/// Accepts a plain `YYYY-MM-DD` date (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
  }
  DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn money_helpers() {
    assert_eq!(to_cents(12.345), Some(1235));
    assert_eq!(to_cents(0.1 + 0.2), Some(30));
    assert_eq!(to_cents(1e17), None);
    assert_eq!(to_cents(f64::INFINITY), None);
    assert_eq!(format_cents(1250), "12.50");
    assert_eq!(format_cents(5), "0.05");
    assert_eq!(format_cents(-5), "-0.05");
    assert_eq!(parse_amount_cents("1000"), Some(100_000));
    assert_eq!(parse_amount_cents(" 19.9 "), Some(1990));
    assert_eq!(parse_amount_cents("abc"), None);
    assert_eq!(parse_amount_cents("1e30"), None);
  }

  #[test]
  fn totals_refuse_to_overflow() {
    assert_eq!(line_total_cents(1250, 3), Some(3750));
    assert_eq!(line_total_cents(i64::MAX, 2), None);
    assert_eq!(sum_cents([100, 250]), Some(350));
    assert_eq!(sum_cents([i64::MAX, 1]), None);
  }

  #[test]
  fn dates_parse_in_both_forms() {
    use chrono::Datelike;
    let d = parse_date_time("2026-03-15").unwrap();
    assert_eq!((d.year(), d.month(), d.day()), (2026, 3, 15));
    assert!(parse_date_time("2026-03-15T10:00:00+05:30").is_some());
    assert!(parse_date_time("next week").is_none());
  }
}
