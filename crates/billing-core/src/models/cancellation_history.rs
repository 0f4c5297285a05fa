use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Tier;

/// Drives the 7-day anti-abuse cooldown after a service is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceCancellationHistory {
    pub id: i64,
    pub customer_id: i32,
    pub service_type: String,
    pub previous_tier: Tier,
    pub billing_period_ended_at: DateTime<Utc>,
    pub deleted_at: DateTime<Utc>,
    pub cooldown_expires_at: DateTime<Utc>,
}

impl ServiceCancellationHistory {
    pub fn is_cooldown_active(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_expires_at > now
    }
}

/// Free function form kept here because `process_scheduled_cancellations`
/// (C10) and the cleanup job (C13) both need "7 days from now" and must
/// agree on it.
pub fn cooldown_expiry(deleted_at: DateTime<Utc>) -> DateTime<Utc> {
    deleted_at + chrono::Duration::days(7)
}

pub fn naive_date_from(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_expires_seven_days_later() {
        let deleted = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let expires = cooldown_expiry(deleted);
        assert_eq!(expires, DateTime::parse_from_rfc3339("2026-01-08T00:00:00Z").unwrap().with_timezone(&Utc));
    }

    #[test]
    fn cooldown_active_until_expiry() {
        let deleted = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let history = ServiceCancellationHistory {
            id: 1,
            customer_id: 1,
            service_type: "seal".into(),
            previous_tier: Tier::Pro,
            billing_period_ended_at: deleted,
            deleted_at: deleted,
            cooldown_expires_at: cooldown_expiry(deleted),
        };

        let mid_cooldown = DateTime::parse_from_rfc3339("2026-01-05T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(history.is_cooldown_active(mid_cooldown));

        let after_cooldown = DateTime::parse_from_rfc3339("2026-01-09T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(!history.is_cooldown_active(after_cooldown));
    }
}
