use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Main error type for billing-core.
///
/// `Validation` and `System` carry the split spec.md draws between permanent,
/// cacheable failures and transient ones that must never be cached by the
/// idempotency layer. Everything else is a concrete client-facing case named
/// directly by a component (locking, payments, grace period, ...).
#[derive(Debug, ThisError)]
pub enum Error {
    /// Permanent, cacheable failure: bad input, business-rule violation.
    /// Recorded as an admin notification when raised out of validation (C8).
    #[error("validation error [{code}]: {message}")]
    Validation {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Transient, never cached: DB hiccup, provider timeout, unexpected panic
    /// surface. The idempotency wrapper lets this bubble so the next tick
    /// retries the whole operation.
    #[error("system error: {message}{}", cause.as_ref().map(|c| format!(" (cause: {c})")).unwrap_or_default())]
    System {
        message: String,
        cause: Option<String>,
    },

    /// Could not acquire `pg_advisory_xact_lock` for a customer within the
    /// configured timeout.
    #[error("timed out acquiring advisory lock for customer {customer_id}")]
    LockTimeout { customer_id: i32 },

    /// Every provider in the chain declined or errored on a charge attempt.
    #[error("payment failed for invoice {invoice_id}: {message}")]
    PaymentFailed { invoice_id: i64, message: String },

    /// Credits + provider chain together could not cover the invoice total.
    #[error("insufficient balance for invoice {invoice_id}: short {shortfall_cents} cents")]
    InsufficientBalance { invoice_id: i64, shortfall_cents: i64 },

    /// A tier change was requested while a cancellation is already scheduled.
    #[error("service instance {service_instance_id} has a cancellation scheduled; tier change rejected")]
    TierChangeWhileCancellationScheduled { service_instance_id: i64 },

    /// Undo-cancel requested after the grace period already expired.
    #[error("grace period already expired for service instance {service_instance_id}; cannot undo cancellation")]
    GracePeriodExpiredCannotUndo { service_instance_id: i64 },

    /// A retry or tier change was requested before its cooldown elapsed.
    #[error("service instance {service_instance_id} is in cooldown until {retry_after}")]
    CooldownActive { service_instance_id: i64, retry_after: chrono::DateTime<chrono::Utc> },

    /// An operation that requires at least one prior payment found none.
    #[error("service instance {service_instance_id} has no recorded payment yet")]
    NoPaymentYet { service_instance_id: i64 },

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database errors (sqlx wrapped).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with description.
    #[error("error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl Error {
    pub fn validation<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Error::Validation { code: code.into(), message: message.into(), details: None }
    }

    pub fn validation_with_details<C: Into<String>, M: Into<String>>(
        code: C,
        message: M,
        details: serde_json::Value,
    ) -> Self {
        Error::Validation { code: code.into(), message: message.into(), details: Some(details) }
    }

    pub fn system<M: Into<String>>(message: M) -> Self {
        Error::System { message: message.into(), cause: None }
    }

    pub fn system_with_cause<M: Into<String>, C: Into<String>>(message: M, cause: C) -> Self {
        Error::System { message: message.into(), cause: Some(cause.into()) }
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    pub fn other<T: Into<String>>(msg: T) -> Self {
        Error::Other(msg.into())
    }

    /// Whether the caller (idempotency wrapper, processor, periodic job)
    /// should treat this as transient and retry on the next tick.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::System { .. } | Error::Database(_) | Error::LockTimeout { .. } | Error::Io(_)
        )
    }

    /// Whether this is a permanent, cacheable validation-class failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Stable machine-readable code for validation errors; `None` otherwise.
    pub fn validation_code(&self) -> Option<&str> {
        match self {
            Error::Validation { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// HTTP-flavored status code, kept for observability/logging context
    /// even though this crate has no HTTP layer of its own.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::NotFound(_) => 404,
            Error::LockTimeout { .. } => 409,
            Error::PaymentFailed { .. } => 402,
            Error::InsufficientBalance { .. } => 402,
            Error::TierChangeWhileCancellationScheduled { .. } => 409,
            Error::GracePeriodExpiredCannotUndo { .. } => 409,
            Error::CooldownActive { .. } => 429,
            Error::NoPaymentYet { .. } => 409,
            Error::Database(_) => 500,
            Error::Config(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::System { .. } => 500,
            Error::Other(_) => 500,
        }
    }

    /// Category label used on tracing spans/fields for dashboards.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::System { .. } => "system",
            Error::LockTimeout { .. } => "lock_timeout",
            Error::PaymentFailed { .. } => "payment_failed",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::TierChangeWhileCancellationScheduled { .. } => "tier_change_conflict",
            Error::GracePeriodExpiredCannotUndo { .. } => "grace_period_expired",
            Error::CooldownActive { .. } => "cooldown_active",
            Error::NoPaymentYet { .. } => "no_payment_yet",
            Error::NotFound(_) => "not_found",
            Error::Database(_) => "database",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

/// Detailed field-level validation errors, used when `ensure_invoice_valid`
/// (C8) needs to report more than one problem at once.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: Option<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError { field: field.into(), message: message.into(), code: None });
    }

    pub fn add_with_code(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) {
        self.errors.push(FieldError { field: field.into(), message: message.into(), code: Some(code.into()) });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_error(self, code: &str) -> Error {
        let details = serde_json::to_value(&self).ok();
        Error::Validation {
            code: code.to_string(),
            message: "one or more fields failed validation".to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_never_retryable_but_is_cacheable() {
        let err = Error::validation("NEGATIVE_AMOUNT", "bad");
        assert!(!err.retryable());
        assert!(err.is_validation());
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn system_and_lock_timeout_are_retryable() {
        assert!(Error::system("db hiccup").retryable());
        assert!(Error::LockTimeout { customer_id: 1 }.retryable());
        assert!(!Error::LockTimeout { customer_id: 1 }.is_validation());
    }

    #[test]
    fn payment_failed_status_and_category() {
        let err = Error::PaymentFailed { invoice_id: 1, message: "declined".into() };
        assert_eq!(err.status_code(), 402);
        assert_eq!(err.category(), "payment_failed");
        assert!(!err.retryable());
    }

    #[test]
    fn validation_code_exposed_only_for_validation_errors() {
        let err = Error::validation("NEGATIVE_AMOUNT", "bad");
        assert_eq!(err.validation_code(), Some("NEGATIVE_AMOUNT"));
        assert_eq!(Error::NotFound("x".into()).validation_code(), None);
    }
}
