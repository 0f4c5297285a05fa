use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgConnection;

use crate::error::Error;
use crate::repository::traits::IdempotencyRepository;
use crate::Result;

/// Outcome of a `with_idempotency`-wrapped call: either the result of
/// running `op` for the first time, or a previously cached one.
#[derive(Debug, Clone)]
pub struct IdempotentOutcome<T> {
    pub value: T,
    pub cached: bool,
}

/// Cache keyed operation results across retries (C3). Caches both success
/// and typed validation failure, but lets transient/system errors bubble
/// uncached so the next tick can retry the whole operation.
pub struct IdempotencyService {
    repo: Arc<dyn IdempotencyRepository>,
}

impl IdempotencyService {
    pub fn new(repo: Arc<dyn IdempotencyRepository>) -> Self {
        Self { repo }
    }

    pub async fn with_idempotency<T, F, Fut>(
        &self,
        conn: &mut PgConnection,
        key: &str,
        op: F,
    ) -> Result<IdempotentOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut PgConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(record) = self.repo.find(conn, key).await? {
            let cached_result: CachedResult<T> = serde_json::from_value(record.response)?;
            return match cached_result {
                CachedResult::Ok(value) => Ok(IdempotentOutcome { value, cached: true }),
                CachedResult::Validation { code, message, details } => {
                    Err(Error::Validation { code, message, details })
                }
            };
        }

        match op(&mut *conn).await {
            Ok(value) => {
                let cached = CachedResult::Ok(&value);
                let response = serde_json::to_value(&cached)?;
                self.repo.insert(conn, key, None, response).await?;
                Ok(IdempotentOutcome { value, cached: false })
            }
            Err(Error::Validation { code, message, details }) => {
                let cached: CachedResult<&()> =
                    CachedResult::Validation { code: code.clone(), message: message.clone(), details: details.clone() };
                let response = serde_json::to_value(&cached)?;
                self.repo.insert(conn, key, None, response).await?;
                Err(Error::Validation { code, message, details })
            }
            // System/transient errors (including everything else client-
            // facing) bubble out uncached per spec.md §4.3's policy.
            Err(other) => Err(other),
        }
    }

    pub async fn sweep_older_than_days(&self, conn: &mut PgConnection, now: DateTime<Utc>, days: i64) -> Result<u64> {
        let cutoff = now - chrono::Duration::days(days);
        self.repo.sweep_older_than(conn, cutoff).await
    }
}

/// Wire format for a cached idempotency response: either the serialized
/// success value, or the specific validation failure that was recorded.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome")]
enum CachedResult<T> {
    #[serde(rename = "ok")]
    Ok(T),
    #[serde(rename = "validation")]
    Validation {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },
}

pub fn monthly_key(customer_id: i32, year: i32, month: u32) -> String {
    format!("monthly-{}-{:04}-{:02}", customer_id, year, month)
}

pub fn usage_key(customer_id: i32, ts: DateTime<Utc>) -> String {
    format!("usage-{}-{}", customer_id, ts.timestamp())
}

pub fn provider_key(invoice_id: i64, provider: &str) -> String {
    format!("inv_{}_{}", invoice_id, provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_key_is_stable_per_customer_and_month() {
        let a = monthly_key(42, 2026, 1);
        let b = monthly_key(42, 2026, 1);
        assert_eq!(a, b);
        assert_eq!(a, "monthly-42-2026-01");
        assert_ne!(a, monthly_key(42, 2026, 2));
        assert_ne!(a, monthly_key(43, 2026, 1));
    }

    #[test]
    fn usage_key_is_stable_per_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2026-01-15T08:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(usage_key(7, ts), usage_key(7, ts));
        assert_ne!(usage_key(7, ts), usage_key(8, ts));
    }

    #[test]
    fn provider_key_distinguishes_providers_on_same_invoice() {
        assert_ne!(provider_key(1, "escrow"), provider_key(1, "card"));
        assert_eq!(provider_key(1, "escrow"), provider_key(1, "escrow"));
    }

    #[test]
    fn cached_result_round_trips_through_json() {
        let ok: CachedResult<i64> = CachedResult::Ok(900);
        let encoded = serde_json::to_value(&ok).unwrap();
        let decoded: CachedResult<i64> = serde_json::from_value(encoded).unwrap();
        match decoded {
            CachedResult::Ok(v) => assert_eq!(v, 900),
            CachedResult::Validation { .. } => panic!("expected Ok"),
        }

        let validation: CachedResult<i64> = CachedResult::Validation {
            code: "NEGATIVE_AMOUNT".to_string(),
            message: "bad".to_string(),
            details: None,
        };
        let encoded = serde_json::to_value(&validation).unwrap();
        let decoded: CachedResult<i64> = serde_json::from_value(encoded).unwrap();
        match decoded {
            CachedResult::Validation { code, .. } => assert_eq!(code, "NEGATIVE_AMOUNT"),
            CachedResult::Ok(_) => panic!("expected Validation"),
        }
    }
}
