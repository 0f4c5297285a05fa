pub mod cleanup;
pub mod clock;
pub mod config;
pub mod credits;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod invoices;
pub mod locking;
pub mod models;
pub mod payment;
pub mod periodic;
pub mod reconciliation;
pub mod repository;
pub mod services;
pub mod usage;
pub mod validation;

pub use cleanup::CleanupService;
pub use clock::{Clock, InMemoryClockStore, MockClock, MockClockStore, WallClock};
pub use config::{
    ClockConfig, ClockSource, Config, DatabaseConfig, DunningConfig, LoggingConfig,
    PeriodicJobConfig, ProviderConfig,
};
pub use credits::{CreditApplicationResult, CreditService};
pub use db::{create_pool, migrate};
pub use error::{Error, Result};
pub use idempotency::{monthly_key, provider_key, usage_key, IdempotencyService, IdempotentOutcome};
pub use invoices::InvoiceService;
pub use locking::CustomerLock;
pub use payment::chain::{load_provider_chain, ProviderRegistry};
pub use payment::processor::{PaymentOutcome, PaymentProcessor};
pub use payment::{ChargeParams, ChargeResult, PaymentProvider, ProviderInfo};
pub use periodic::{PeriodicJob, PeriodicJobReport};
pub use reconciliation::{ReconciliationReport, ReconciliationService};
pub use services::{
    CustomerBillingProcessor, CustomerBillingReport, GraceService, Phase1Result,
    ServiceBillingOutcome, ServiceBillingService, TierService,
};
pub use usage::{UsageBucket, UsageService};
pub use validation::InvoiceValidator;

/// Current version of the billing engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("TEST", "test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
