use std::sync::Arc;

use chrono::Datelike;
use sqlx::{PgConnection, PgPool};

use crate::clock::{first_of_next_month, last_of_month, Clock};
use crate::models::{BillingType, Invoice, InvoiceStatus, InvoiceType, ItemType};
use crate::repository::traits::{InvoiceRepository, NewInvoice, NewLineItem};
use crate::Result;

/// One line item to create alongside an invoice, e.g. the single
/// `subscription_<tier>` item for a first-month charge or the
/// `tier_upgrade` item for an upgrade.
#[derive(Debug, Clone)]
pub struct LineItemParams {
    pub item_type: ItemType,
    pub service_type: String,
    pub quantity: i32,
    pub unit_price_usd_cents: i64,
    pub amount_usd_cents: i64,
}

#[derive(Debug, Clone)]
pub struct CreateImmediateInvoiceParams {
    pub customer_id: i32,
    pub amount_usd_cents: i64,
    pub line_items: Vec<LineItemParams>,
}

/// CRUD + state transitions for billing records and line items (C4).
#[derive(Clone)]
pub struct InvoiceService {
    repo: Arc<dyn InvoiceRepository>,
    clock: Arc<dyn Clock>,
}

impl InvoiceService {
    pub fn new(repo: Arc<dyn InvoiceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Finds the sole DRAFT for `customer_id` or creates one whose period is
    /// the next calendar month. Must run under the customer lock.
    pub async fn get_or_create_draft(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Invoice> {
        if let Some(draft) = self.repo.find_draft(conn, customer_id).await? {
            return Ok(draft);
        }

        let today = self.clock.today().await?;
        let period_start = first_of_next_month(today);
        let period_end = last_of_month(period_start);
        let invoice_number =
            self.repo.next_invoice_number(conn, period_start.year(), period_start.month()).await?;

        self.repo
            .create(
                conn,
                NewInvoice {
                    customer_id,
                    billing_type: BillingType::Periodic,
                    r#type: InvoiceType::Charge,
                    status: InvoiceStatus::Draft,
                    amount_usd_cents: 0,
                    billing_period_start: period_start,
                    billing_period_end: period_end,
                    due_date: period_start,
                    invoice_number,
                },
            )
            .await
    }

    pub async fn update_draft_amount(&self, conn: &mut PgConnection, draft_id: i64, new_cents: i64) -> Result<()> {
        self.repo.update_amount(conn, draft_id, new_cents).await
    }

    pub async fn transition_draft_to_pending(&self, conn: &mut PgConnection, draft_id: i64) -> Result<()> {
        self.repo.update_status(conn, draft_id, InvoiceStatus::Pending).await
    }

    /// Creates an invoice in `pending` state with `billing_type=immediate`,
    /// including all line items atomically, in the caller's own
    /// transaction (the customer lock's transaction).
    pub async fn create_and_charge_immediately(
        &self,
        conn: &mut PgConnection,
        params: CreateImmediateInvoiceParams,
    ) -> Result<Invoice> {
        let today = self.clock.today().await?;
        let invoice_number = self.repo.next_invoice_number(conn, today.year(), today.month()).await?;
        let period_end = today + chrono::Duration::days(30);

        let invoice = self
            .repo
            .create(
                conn,
                NewInvoice {
                    customer_id: params.customer_id,
                    billing_type: BillingType::Immediate,
                    r#type: InvoiceType::Charge,
                    status: InvoiceStatus::Pending,
                    amount_usd_cents: params.amount_usd_cents,
                    billing_period_start: today,
                    billing_period_end: period_end,
                    due_date: today,
                    invoice_number,
                },
            )
            .await?;

        self.insert_line_items(conn, invoice.id, &params.line_items).await?;
        Ok(invoice)
    }

    /// Same shape as [`Self::create_and_charge_immediately`] but commits
    /// independently of any outer lock — the middle step of the two-phase
    /// tier upgrade (C10), so a durable audit trail survives a crash between
    /// Phase 1 validation and Phase 2 charging.
    pub async fn create_pending_invoice_committed(
        &self,
        pool: &PgPool,
        params: CreateImmediateInvoiceParams,
    ) -> Result<Invoice> {
        let mut tx = pool.begin().await?;
        let invoice = self.create_and_charge_immediately(&mut tx, params).await?;
        tx.commit().await?;
        Ok(invoice)
    }

    async fn insert_line_items(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        items: &[LineItemParams],
    ) -> Result<()> {
        for item in items {
            self.repo
                .insert_line_item(
                    conn,
                    NewLineItem {
                        invoice_id,
                        item_type: item.item_type,
                        service_type: item.service_type.clone(),
                        quantity: item.quantity,
                        unit_price_usd_cents: item.unit_price_usd_cents,
                        amount_usd_cents: item.amount_usd_cents,
                        description: Some(item.item_type.description(&item.service_type)),
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub async fn void_invoice(&self, conn: &mut PgConnection, id: i64, reason: &str) -> Result<()> {
        self.repo.void(conn, id, reason).await
    }

    /// Physically removes an invoice and its line items. Used when the
    /// business deliberately abandons an unpaid attempt.
    pub async fn delete_unpaid_invoice(&self, conn: &mut PgConnection, id: i64) -> Result<()> {
        self.repo.delete_unpaid(conn, id).await
    }

    pub async fn mark_invoice_paid(
        &self,
        conn: &mut PgConnection,
        id: i64,
        amount_paid: i64,
        tx_digest: &str,
    ) -> Result<()> {
        self.repo.mark_paid(conn, id, amount_paid, tx_digest).await
    }

    /// Rewrites an unpaid invoice's single subscription line item and total
    /// in place — the helper spec.md §9 calls out as shared by both upgrade
    /// and downgrade paths, since billing-history descriptions are derived
    /// from the line item's `item_type`, not the invoice itself.
    pub async fn rewrite_subscription_line_item(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        service_type: &str,
        new_item_type: ItemType,
        new_price_cents: i64,
    ) -> Result<()> {
        self.repo.delete_non_usage_line_items(conn, invoice_id).await?;
        self.repo
            .insert_line_item(
                conn,
                NewLineItem {
                    invoice_id,
                    item_type: new_item_type,
                    service_type: service_type.to_string(),
                    quantity: 1,
                    unit_price_usd_cents: new_price_cents,
                    amount_usd_cents: new_price_cents,
                    description: Some(new_item_type.description(service_type)),
                },
            )
            .await?;
        self.repo.update_amount(conn, invoice_id, new_price_cents).await?;
        Ok(())
    }

    pub fn repo(&self) -> &Arc<dyn InvoiceRepository> {
        &self.repo
    }
}
