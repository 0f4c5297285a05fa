use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default 28-day rolling spending limit, in cents, for a new customer.
pub const DEFAULT_SPENDING_LIMIT_USD_CENTS: i64 = 25_000_00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Suspended,
    Closed,
}

/// Created once by an external collaborator on first login; never deleted by
/// the billing engine.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub customer_id: i32,
    pub wallet_identifier: String,
    pub escrow_account_handle: Option<String>,
    pub status: CustomerStatus,
    /// 0 = unlimited.
    pub spending_limit_usd_cents: i64,
    /// Cached mirror of the external escrow balance.
    pub current_balance_usd_cents: i64,
    pub current_period_charged_usd_cents: i64,
    pub current_period_start: NaiveDate,
    pub card_provider_handle: Option<String>,
    pub paid_once: bool,
    pub grace_period_start: Option<NaiveDate>,
    /// Ordered sequence of notification timestamps sent during the current
    /// grace window, stored as JSON since Postgres has no native array-of-
    /// timestamptz-with-order guarantee worth relying on here.
    pub grace_period_notified_at: serde_json::Value,
}

impl Customer {
    pub fn grace_period_notifications(&self) -> Vec<DateTime<Utc>> {
        serde_json::from_value(self.grace_period_notified_at.clone()).unwrap_or_default()
    }

    pub fn is_grace_period_expired(&self, today: NaiveDate, grace_period_days: u32) -> bool {
        match self.grace_period_start {
            Some(start) => (today - start).num_days() >= grace_period_days as i64,
            None => false,
        }
    }
}

/// Rejects non-positive customer ids per the boundary test in spec.md §8.
pub fn validate_customer_id(customer_id: i32) -> crate::Result<()> {
    if customer_id <= 0 {
        return Err(crate::Error::validation(
            "INVALID_CUSTOMER_ID",
            format!("customer_id must be a positive integer, got {}", customer_id),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_negative_ids() {
        assert!(validate_customer_id(0).is_err());
        assert!(validate_customer_id(-1).is_err());
        assert!(validate_customer_id(1).is_ok());
    }

    #[test]
    fn grace_expiry_boundary() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        // 14 days exactly at day 29 -> expired.
        let customer = Customer {
            customer_id: 1,
            wallet_identifier: "w".into(),
            escrow_account_handle: None,
            status: CustomerStatus::Active,
            spending_limit_usd_cents: DEFAULT_SPENDING_LIMIT_USD_CENTS,
            current_balance_usd_cents: 0,
            current_period_charged_usd_cents: 0,
            current_period_start: start,
            card_provider_handle: None,
            paid_once: true,
            grace_period_start: Some(start),
            grace_period_notified_at: serde_json::json!([]),
        };
        assert!(customer.is_grace_period_expired(today, 14));
        assert!(!customer.is_grace_period_expired(
            NaiveDate::from_ymd_opt(2026, 1, 28).unwrap(),
            14
        ));
    }
}
