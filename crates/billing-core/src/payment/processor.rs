use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::credits::CreditService;
use crate::models::{InvoiceStatus, PaymentSourceType};
use crate::payment::{ChargeParams, PaymentProvider};
use crate::repository::traits::{InvoiceRepository, NewInvoicePayment};
use crate::Result;

/// Result of attempting to settle an invoice against credits and the
/// provider chain (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub invoice_id: i64,
    pub fully_paid: bool,
    pub amount_paid_cents: i64,
    pub payment_sources: Vec<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct PaymentProcessor {
    invoices: Arc<dyn InvoiceRepository>,
    credits: CreditService,
    clock: Arc<dyn Clock>,
}

impl PaymentProcessor {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, credits: CreditService, clock: Arc<dyn Clock>) -> Self {
        Self { invoices, credits, clock }
    }

    /// Settles `invoice_id` against available credits first, then the given
    /// provider chain in order, stopping as soon as the invoice is fully
    /// paid. A provider that reports `retryable=false` without paying does
    /// not block later providers in the chain; only chain exhaustion with a
    /// remaining balance fails the invoice.
    pub async fn process_invoice_payment(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        providers: &[Arc<dyn PaymentProvider>],
    ) -> Result<PaymentOutcome> {
        let invoice = self
            .invoices
            .find_by_id(conn, invoice_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("invoice {invoice_id}")))?;

        if invoice.status == InvoiceStatus::Paid {
            return Ok(PaymentOutcome {
                invoice_id,
                fully_paid: true,
                amount_paid_cents: invoice.amount_paid_usd_cents,
                payment_sources: Vec::new(),
                error: None,
            });
        }

        let mut sources = Vec::new();
        let mut paid_so_far = self.invoices.sum_paid(conn, invoice_id).await?;
        let mut remaining = invoice.amount_usd_cents - paid_so_far;

        if remaining > 0 {
            let applied = self
                .credits
                .apply_credits_to_invoice(conn, invoice.customer_id, invoice_id, remaining)
                .await?;
            if applied.applied_cents > 0 {
                sources.push("credit".to_string());
                paid_so_far += applied.applied_cents;
                remaining = applied.remaining_cents;
            }
        }

        let mut last_error = None;
        for provider in providers {
            if remaining <= 0 {
                break;
            }
            if !provider.can_pay(invoice.customer_id, remaining).await? {
                continue;
            }
            let result = provider
                .charge(ChargeParams {
                    customer_id: invoice.customer_id,
                    invoice_id,
                    amount_usd_cents: remaining,
                })
                .await?;

            if result.success {
                let reference = result.provider_reference.clone().unwrap_or_default();
                self.invoices
                    .insert_payment(
                        conn,
                        NewInvoicePayment {
                            invoice_id,
                            source_type: provider_source_type(provider.id()),
                            credit_id: None,
                            provider_transaction_id: Some(reference.clone()),
                            amount_usd_cents: remaining,
                        },
                    )
                    .await?;
                paid_so_far += remaining;
                remaining = 0;
                sources.push(provider.id().to_string());
                self.invoices.mark_paid(conn, invoice_id, paid_so_far, &reference).await?;
                info!(invoice_id, provider = provider.id(), "invoice paid");
            } else {
                warn!(invoice_id, provider = provider.id(), error = ?result.error, "provider charge failed");
                last_error = result.error.clone();
                if !result.retryable {
                    continue;
                }
            }
        }

        let fully_paid = remaining <= 0;
        if !fully_paid {
            let now = self.clock.now().await?;
            self.invoices
                .mark_failed(
                    conn,
                    invoice_id,
                    last_error.as_deref().unwrap_or("no provider could settle the balance"),
                    invoice.retry_count + 1,
                    now,
                )
                .await?;
        }

        Ok(PaymentOutcome {
            invoice_id,
            fully_paid,
            amount_paid_cents: paid_so_far,
            payment_sources: sources,
            error: if fully_paid { None } else { last_error },
        })
    }
}

fn provider_source_type(provider_id: &str) -> PaymentSourceType {
    match provider_id {
        "escrow" => PaymentSourceType::EscrowProvider,
        "card" => PaymentSourceType::CardProvider,
        "wallet" => PaymentSourceType::WalletProvider,
        _ => PaymentSourceType::CardProvider,
    }
}
