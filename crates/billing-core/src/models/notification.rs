use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

/// Append-only sink; no acknowledgement required before the caller proceeds.
/// Ambient row (not narrowly keyed by spec.md) so it gets a `Uuid` identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminNotification {
    pub id: Uuid,
    pub severity: NotificationSeverity,
    pub category: String,
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    pub customer_id: Option<i32>,
    pub invoice_id: Option<i64>,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}
