use std::sync::Arc;

use sqlx::PgConnection;
use tracing::warn;

use crate::models::NotificationSeverity;
use crate::repository::traits::{CreditRepository, InvoiceRepository, NewNotification, NotificationRepository};
use crate::Result;

/// Invariant checks run before an invoice is treated as settle-ready (C8).
/// Critical issues raise a cacheable `Error::Validation`; warnings are
/// persisted as an admin notification and logged, but do not block the
/// caller.
#[derive(Clone)]
pub struct InvoiceValidator {
    invoices: Arc<dyn InvoiceRepository>,
    credits: Arc<dyn CreditRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl InvoiceValidator {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        credits: Arc<dyn CreditRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self { invoices, credits, notifications }
    }

    /// Checks NEGATIVE_AMOUNT and MULTIPLE_DRAFT_INVOICES as hard failures,
    /// and ORPHANED_RECONCILIATION_CREDITS as a warning. DRAFT_AMOUNT_MISMATCH
    /// is raised by the recalculator itself (C9), not here, since only it
    /// knows the expected total at the moment of comparison.
    pub async fn ensure_invoice_valid(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<()> {
        let invoice = self
            .invoices
            .find_by_id(conn, invoice_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("invoice {invoice_id}")))?;

        if invoice.amount_usd_cents < 0 {
            self.notify_critical(
                conn,
                "NEGATIVE_AMOUNT",
                format!("invoice {invoice_id} has a negative amount"),
                invoice.customer_id,
                Some(invoice_id),
            )
            .await?;
            return Err(crate::Error::validation(
                "NEGATIVE_AMOUNT",
                format!("invoice {invoice_id} amount_usd_cents is negative"),
            ));
        }

        let draft_count = self.invoices.count_drafts(conn, invoice.customer_id).await?;
        if draft_count > 1 {
            self.notify_critical(
                conn,
                "MULTIPLE_DRAFT_INVOICES",
                format!("customer {} has {} draft invoices", invoice.customer_id, draft_count),
                invoice.customer_id,
                Some(invoice_id),
            )
            .await?;
            return Err(crate::Error::validation(
                "MULTIPLE_DRAFT_INVOICES",
                format!("customer {} has more than one draft invoice", invoice.customer_id),
            ));
        }

        let orphaned = self.credits.count_orphaned_reconciliation_credits(conn, invoice.customer_id).await?;
        if orphaned > 0 {
            self.notify_warning(
                conn,
                "ORPHANED_RECONCILIATION_CREDITS",
                format!(
                    "customer {} has {} reconciliation credit(s) with no service instances",
                    invoice.customer_id, orphaned
                ),
                invoice.customer_id,
                Some(invoice_id),
            )
            .await?;
        }

        Ok(())
    }

    async fn notify_critical(
        &self,
        conn: &mut PgConnection,
        code: &str,
        message: String,
        customer_id: i32,
        invoice_id: Option<i64>,
    ) -> Result<()> {
        warn!(code, customer_id, ?invoice_id, "validation failure");
        self.notifications
            .record(
                conn,
                NewNotification {
                    severity: NotificationSeverity::Error,
                    category: "validation".to_string(),
                    code: code.to_string(),
                    message,
                    details: serde_json::Value::Null,
                    customer_id: Some(customer_id),
                    invoice_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn notify_warning(
        &self,
        conn: &mut PgConnection,
        code: &str,
        message: String,
        customer_id: i32,
        invoice_id: Option<i64>,
    ) -> Result<()> {
        warn!(code, customer_id, ?invoice_id, "validation warning");
        self.notifications
            .record(
                conn,
                NewNotification {
                    severity: NotificationSeverity::Warning,
                    category: "validation".to_string(),
                    code: code.to_string(),
                    message,
                    details: serde_json::Value::Null,
                    customer_id: Some(customer_id),
                    invoice_id,
                },
            )
            .await?;
        Ok(())
    }
}
