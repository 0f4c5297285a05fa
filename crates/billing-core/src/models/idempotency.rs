use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ambient row — introduced by this engine rather than named with a narrower
/// key by spec.md, so it gets a `Uuid` identity per SPEC_FULL.md §J.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub billing_record_id: Option<i64>,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
