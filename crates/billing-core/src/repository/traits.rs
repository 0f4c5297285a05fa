use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;

use crate::models::*;
use crate::Result;

pub struct NewServiceInstance {
    pub customer_id: i32,
    pub service_type: String,
    pub state: ServiceState,
    pub tier: Tier,
    pub current_tier_price_usd_cents: i64,
    pub config: serde_json::Value,
    pub sub_pending_invoice_id: Option<i64>,
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Option<Customer>>;
    async fn update(&self, conn: &mut PgConnection, customer: &Customer) -> Result<()>;
    /// All customer ids, used as the top-level iteration set by the
    /// periodic job (C15). Paging is left to the caller for large fleets.
    async fn list_all_ids(&self, conn: &mut PgConnection) -> Result<Vec<i32>>;
}

#[async_trait]
pub trait ServiceInstanceRepository: Send + Sync {
    async fn find(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
    ) -> Result<Option<ServiceInstance>>;
    async fn find_by_id(&self, conn: &mut PgConnection, id: i64) -> Result<Option<ServiceInstance>>;
    async fn list_by_customer(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Vec<ServiceInstance>>;
    async fn create(&self, conn: &mut PgConnection, new: NewServiceInstance) -> Result<ServiceInstance>;
    async fn update(&self, conn: &mut PgConnection, instance: &ServiceInstance) -> Result<()>;
    async fn delete(&self, conn: &mut PgConnection, id: i64) -> Result<()>;
    async fn find_scheduled_tier_due(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        today: NaiveDate,
    ) -> Result<Vec<ServiceInstance>>;
    async fn find_scheduled_cancellation_due(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        today: NaiveDate,
    ) -> Result<Vec<ServiceInstance>>;
    /// Global scan (no customer filter) for C13's periodic sweep; the caller
    /// re-reads under each customer's own lock before mutating.
    async fn find_cancellation_pending_due(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceInstance>>;
    async fn find_active_by_cooldown_scope(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
    ) -> Result<Option<ServiceInstance>>;
}

pub struct NewInvoice {
    pub customer_id: i32,
    pub billing_type: BillingType,
    pub r#type: InvoiceType,
    pub status: InvoiceStatus,
    pub amount_usd_cents: i64,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_number: String,
}

pub struct NewLineItem {
    pub invoice_id: i64,
    pub item_type: ItemType,
    pub service_type: String,
    pub quantity: i32,
    pub unit_price_usd_cents: i64,
    pub amount_usd_cents: i64,
    pub description: Option<String>,
}

pub struct NewInvoicePayment {
    pub invoice_id: i64,
    pub source_type: PaymentSourceType,
    pub credit_id: Option<i64>,
    pub provider_transaction_id: Option<String>,
    pub amount_usd_cents: i64,
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_draft(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Option<Invoice>>;
    async fn find_by_id(&self, conn: &mut PgConnection, id: i64) -> Result<Option<Invoice>>;
    async fn count_drafts(&self, conn: &mut PgConnection, customer_id: i32) -> Result<i64>;
    async fn next_invoice_number(&self, conn: &mut PgConnection, year: i32, month: u32) -> Result<String>;
    async fn create(&self, conn: &mut PgConnection, new: NewInvoice) -> Result<Invoice>;
    async fn update_amount(&self, conn: &mut PgConnection, id: i64, amount_usd_cents: i64) -> Result<()>;
    async fn update_status(&self, conn: &mut PgConnection, id: i64, status: InvoiceStatus) -> Result<()>;
    async fn mark_paid(
        &self,
        conn: &mut PgConnection,
        id: i64,
        amount_paid_usd_cents: i64,
        tx_digest: &str,
    ) -> Result<()>;
    async fn mark_failed(
        &self,
        conn: &mut PgConnection,
        id: i64,
        failure_reason: &str,
        retry_count: i32,
        last_retry_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn void(&self, conn: &mut PgConnection, id: i64, reason: &str) -> Result<()>;
    async fn delete_unpaid(&self, conn: &mut PgConnection, id: i64) -> Result<()>;
    async fn list_line_items(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<Vec<InvoiceLineItem>>;
    async fn insert_line_item(&self, conn: &mut PgConnection, item: NewLineItem) -> Result<InvoiceLineItem>;
    async fn delete_non_usage_line_items(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<()>;
    async fn delete_line_items_of_type(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        item_type: ItemType,
    ) -> Result<()>;
    async fn insert_payment(&self, conn: &mut PgConnection, payment: NewInvoicePayment) -> Result<InvoicePayment>;
    async fn list_payments(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<Vec<InvoicePayment>>;
    async fn sum_paid(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<i64>;
    /// Global, read-only scan used by reconciliation (C12) before taking any
    /// per-customer lock.
    async fn find_stuck_immediate_pending(
        &self,
        conn: &mut PgConnection,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Invoice>>;
    async fn find_failed_retriable(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        max_retries: i32,
        retry_after: DateTime<Utc>,
    ) -> Result<Vec<Invoice>>;
}

pub struct NewCredit {
    pub customer_id: i32,
    pub original_amount_usd_cents: i64,
    pub reason: CreditReason,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub campaign_id: Option<String>,
}

#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// Non-expired credits with `remaining > 0`, ordered `expires_at NULLS
    /// LAST` so the soonest-expiring are consumed first (C5).
    async fn list_usable_ordered(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CustomerCredit>>;
    async fn decrement_remaining(&self, conn: &mut PgConnection, credit_id: i64, amount: i64) -> Result<()>;
    async fn create(&self, conn: &mut PgConnection, new: NewCredit) -> Result<CustomerCredit>;
    async fn sum_available(&self, conn: &mut PgConnection, customer_id: i32, now: DateTime<Utc>) -> Result<i64>;
    /// Reconciliation credits (`reason=reconciliation`) with `remaining > 0`
    /// belonging to a customer who has no service instances at all — the
    /// ORPHANED_RECONCILIATION_CREDITS warning in C8.
    async fn count_orphaned_reconciliation_credits(&self, conn: &mut PgConnection, customer_id: i32) -> Result<i64>;
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(&self, conn: &mut PgConnection, key: &str) -> Result<Option<IdempotencyRecord>>;
    async fn insert(
        &self,
        conn: &mut PgConnection,
        key: &str,
        billing_record_id: Option<i64>,
        response: serde_json::Value,
    ) -> Result<()>;
    async fn sweep_older_than(&self, conn: &mut PgConnection, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct NewCancellationHistory {
    pub customer_id: i32,
    pub service_type: String,
    pub previous_tier: Tier,
    pub billing_period_ended_at: DateTime<Utc>,
    pub deleted_at: DateTime<Utc>,
    pub cooldown_expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CancellationHistoryRepository: Send + Sync {
    async fn insert(
        &self,
        conn: &mut PgConnection,
        new: NewCancellationHistory,
    ) -> Result<ServiceCancellationHistory>;
    async fn find_active_cooldown(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceCancellationHistory>>;
    async fn sweep_older_than(&self, conn: &mut PgConnection, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct NewNotification {
    pub severity: NotificationSeverity,
    pub category: String,
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    pub customer_id: Option<i32>,
    pub invoice_id: Option<i64>,
}

/// Append-only recorder used by validation (C8) and grace/suspension (C11).
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn record(&self, conn: &mut PgConnection, new: NewNotification) -> Result<AdminNotification>;
}

#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    /// Active methods ordered by `priority` ascending. Must be called inside
    /// the customer lock (C6) to prevent races with reordering.
    async fn list_active_ordered(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
    ) -> Result<Vec<CustomerPaymentMethod>>;
}
