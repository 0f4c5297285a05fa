use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info};

use crate::cleanup::CleanupService;
use crate::clock::Clock;
use crate::idempotency::IdempotencyService;
use crate::reconciliation::{ReconciliationReport, ReconciliationService};
use crate::repository::traits::{CancellationHistoryRepository, CustomerRepository};
use crate::services::processor::{CustomerBillingProcessor, CustomerBillingReport};
use crate::Result;

/// How long a consumed idempotency record is kept before the sweep deletes
/// it — long enough to outlive any retry window.
const IDEMPOTENCY_RETENTION_DAYS: i64 = 90;
/// How long a cancellation-history row is kept after its cooldown has
/// elapsed, for anti-abuse auditing.
const CANCELLATION_HISTORY_RETENTION_DAYS: i64 = 30;

/// Structured result of one [`run_periodic_job`] pass, modeled on the
/// teacher's job-execution reports: per-phase counters plus every
/// per-customer error encountered, none of which aborts the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodicJobReport {
    pub customers_processed: u32,
    pub customers_failed: u32,
    pub billing_errors: Vec<String>,
    pub reconciliation: ReconciliationReport,
    pub cleanup_processed: u32,
    pub idempotency_records_swept: u64,
    pub cancellation_history_rows_swept: u64,
    pub duration_ms: u64,
}

/// Top-level entry point for the recurring worker tick (C15). Phases run in
/// strict order — billing, reconciliation, cleanup, housekeeping — since
/// later phases assume earlier ones already settled what they could.
pub struct PeriodicJob {
    pool: PgPool,
    billing: CustomerBillingProcessor,
    reconciliation: ReconciliationService,
    cleanup: CleanupService,
    idempotency: IdempotencyService,
    customers: Arc<dyn CustomerRepository>,
    cancellation_history: Arc<dyn CancellationHistoryRepository>,
    clock: Arc<dyn Clock>,
}

impl PeriodicJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        billing: CustomerBillingProcessor,
        reconciliation: ReconciliationService,
        cleanup: CleanupService,
        idempotency: IdempotencyService,
        customers: Arc<dyn CustomerRepository>,
        cancellation_history: Arc<dyn CancellationHistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pool, billing, reconciliation, cleanup, idempotency, customers, cancellation_history, clock }
    }

    /// Runs every phase across every customer.
    pub async fn run(&self) -> Result<PeriodicJobReport> {
        let started = Instant::now();
        let mut report = PeriodicJobReport::default();

        let customer_ids = {
            let mut conn = self.pool.acquire().await?;
            self.customers.list_all_ids(&mut conn).await?
        };

        for customer_id in customer_ids {
            match self.billing.process_customer(customer_id).await {
                Ok(_) => report.customers_processed += 1,
                Err(e) => {
                    report.customers_failed += 1;
                    error!(customer_id, error = %e, "billing tick failed for customer");
                    report.billing_errors.push(format!("customer {customer_id}: {e}"));
                }
            }
        }

        report.reconciliation = self.reconciliation.reconcile(&self.pool).await?;
        report.cleanup_processed = self.cleanup.run().await?;

        let now = self.clock.now().await?;
        let mut conn = self.pool.acquire().await?;
        report.idempotency_records_swept =
            self.idempotency.sweep_older_than_days(&mut conn, now, IDEMPOTENCY_RETENTION_DAYS).await?;
        let cutoff = now - chrono::Duration::days(CANCELLATION_HISTORY_RETENTION_DAYS);
        report.cancellation_history_rows_swept = self.cancellation_history.sweep_older_than(&mut conn, cutoff).await?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            customers_processed = report.customers_processed,
            customers_failed = report.customers_failed,
            duration_ms = report.duration_ms,
            "periodic job completed"
        );
        Ok(report)
    }

    /// Runs every phase but scoped to a single customer — used by admin
    /// tooling and tests that need to drive one account's billing
    /// deterministically.
    pub async fn run_for_customer(&self, customer_id: i32) -> Result<CustomerBillingReport> {
        let report = self.billing.process_customer(customer_id).await?;
        self.reconciliation.reconcile(&self.pool).await?;
        self.cleanup.run().await?;
        Ok(report)
    }
}
