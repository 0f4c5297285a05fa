use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::repository::traits::InvoiceRepository;
use crate::Result;

const STUCK_PENDING_THRESHOLD_MINUTES: i64 = 10;

/// Summary of one reconciliation pass (C12).
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub marked_paid: u32,
    pub voided: u32,
}

/// Recovers `immediate ∧ pending` invoices stuck past the two-phase upgrade's
/// crash window, or any similar mid-flow crash (e.g. subscribe).
pub struct ReconciliationService {
    invoices: Arc<dyn InvoiceRepository>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { invoices, clock }
    }

    /// Global, lock-free scan — each stuck invoice is resolved independently
    /// via a direct pooled connection, since reconciliation only ever
    /// inspects and finalizes an already-settled or truly abandoned attempt.
    pub async fn reconcile(&self, pool: &sqlx::PgPool) -> Result<ReconciliationReport> {
        let mut conn = pool.acquire().await?;
        let now = self.clock.now().await?;
        let cutoff = now - Duration::minutes(STUCK_PENDING_THRESHOLD_MINUTES);

        let stuck = self.invoices.find_stuck_immediate_pending(&mut conn, cutoff).await?;
        let mut report = ReconciliationReport::default();

        for invoice in stuck {
            let payments = self.invoices.list_payments(&mut conn, invoice.id).await?;
            if let Some(payment) = payments.first() {
                let amount = invoice.amount_usd_cents;
                let tx_digest = payment.provider_transaction_id.clone().unwrap_or_default();
                self.invoices.mark_paid(&mut conn, invoice.id, amount, &tx_digest).await?;
                report.marked_paid += 1;
                info!(invoice_id = invoice.id, "reconciliation found a payment, marked paid");
            } else {
                self.invoices
                    .void(
                        &mut conn,
                        invoice.id,
                        "reconciliation: no payment found after timeout — operation incomplete",
                    )
                    .await?;
                report.voided += 1;
                warn!(invoice_id = invoice.id, "reconciliation found no payment, voided");
            }
        }

        Ok(report)
    }
}
