use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    Outage,
    Promo,
    Goodwill,
    Reconciliation,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomerCredit {
    pub id: i64,
    pub customer_id: i32,
    pub original_amount_usd_cents: i64,
    pub remaining_amount_usd_cents: i64,
    pub reason: CreditReason,
    pub description: Option<String>,
    /// `None` means never-expiring.
    pub expires_at: Option<DateTime<Utc>>,
    pub campaign_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomerCredit {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.remaining_amount_usd_cents > 0 && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(remaining: i64, expires_at: Option<DateTime<Utc>>) -> CustomerCredit {
        CustomerCredit {
            id: 1,
            customer_id: 1,
            original_amount_usd_cents: remaining,
            remaining_amount_usd_cents: remaining,
            reason: CreditReason::Promo,
            description: None,
            expires_at,
            campaign_id: None,
            created_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
        }
    }

    #[test]
    fn never_expiring_credit_is_usable_while_positive() {
        let now = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(credit(100, None).is_usable(now));
        assert!(!credit(0, None).is_usable(now));
    }

    #[test]
    fn expiry_is_inclusive_of_the_instant() {
        let expires_at = DateTime::parse_from_rfc3339("2026-01-10T00:00:00Z").unwrap().with_timezone(&Utc);
        let c = credit(100, Some(expires_at));

        let before = DateTime::parse_from_rfc3339("2026-01-09T23:59:59Z").unwrap().with_timezone(&Utc);
        assert!(c.is_usable(before));

        assert!(c.is_expired(expires_at));
        assert!(!c.is_usable(expires_at));
    }
}
