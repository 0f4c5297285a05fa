use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::clock::Clock;
use crate::models::{CreditReason, CustomerCredit, PaymentSourceType};
use crate::repository::traits::{CreditRepository, InvoiceRepository, NewCredit, NewInvoicePayment};
use crate::Result;

/// Applying customer credits to invoices under expiry ordering (C5).
#[derive(Clone)]
pub struct CreditService {
    credits: Arc<dyn CreditRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    clock: Arc<dyn Clock>,
}

/// Result of a single credit-application pass over an invoice.
#[derive(Debug, Clone, Default)]
pub struct CreditApplicationResult {
    pub applied_cents: i64,
    pub remaining_cents: i64,
    pub credits_used: Vec<(i64, i64)>,
}

impl CreditService {
    pub fn new(credits: Arc<dyn CreditRepository>, invoices: Arc<dyn InvoiceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { credits, invoices, clock }
    }

    /// Walks non-expired credits with `remaining > 0`, ordered soonest-
    /// expiring first, applying `min(credit.remaining, invoice_remaining)`
    /// to each until the invoice reaches zero remaining. Must run under the
    /// customer lock. Credits consumed here are never rolled back even if a
    /// later provider charge on the same invoice fails.
    pub async fn apply_credits_to_invoice(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        invoice_id: i64,
        invoice_remaining_cents: i64,
    ) -> Result<CreditApplicationResult> {
        let mut remaining = invoice_remaining_cents;
        let mut result = CreditApplicationResult { remaining_cents: remaining, ..Default::default() };
        if remaining <= 0 {
            return Ok(result);
        }

        let now = self.clock.now().await?;
        let usable = self.credits.list_usable_ordered(conn, customer_id, now).await?;

        for credit in usable {
            if remaining <= 0 {
                break;
            }
            let take = credit.remaining_amount_usd_cents.min(remaining);
            if take <= 0 {
                continue;
            }

            self.credits.decrement_remaining(conn, credit.id, take).await?;
            self.invoices
                .insert_payment(
                    conn,
                    NewInvoicePayment {
                        invoice_id,
                        source_type: PaymentSourceType::Credit,
                        credit_id: Some(credit.id),
                        provider_transaction_id: None,
                        amount_usd_cents: take,
                    },
                )
                .await?;

            remaining -= take;
            result.applied_cents += take;
            result.credits_used.push((credit.id, take));
        }

        result.remaining_cents = remaining;
        Ok(result)
    }

    pub async fn issue_credit(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        amount_usd_cents: i64,
        reason: CreditReason,
        description: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        campaign_id: Option<String>,
    ) -> Result<CustomerCredit> {
        self.credits
            .create(
                conn,
                NewCredit {
                    customer_id,
                    original_amount_usd_cents: amount_usd_cents,
                    reason,
                    description,
                    expires_at,
                    campaign_id,
                },
            )
            .await
    }

    pub async fn available_credits(&self, conn: &mut PgConnection, customer_id: i32) -> Result<i64> {
        let now = self.clock.now().await?;
        self.credits.sum_available(conn, customer_id, now).await
    }
}
