use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::{Invoice, InvoiceLineItem, InvoicePayment, InvoiceStatus, ItemType};
use crate::repository::traits::{InvoiceRepository, NewInvoice, NewInvoicePayment, NewLineItem};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresInvoiceRepository;

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn find_draft(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM billing_records WHERE customer_id = $1 AND status = 'draft'",
        )
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
        Ok(invoice)
    }

    async fn find_by_id(&self, conn: &mut PgConnection, id: i64) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM billing_records WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(invoice)
    }

    async fn count_drafts(&self, conn: &mut PgConnection, customer_id: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM billing_records WHERE customer_id = $1 AND status = 'draft'",
        )
        .bind(customer_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    async fn next_invoice_number(&self, conn: &mut PgConnection, year: i32, month: u32) -> Result<String> {
        let prefix = format!("INV-{:04}-{:02}-", year, month);
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM billing_records WHERE invoice_number LIKE $1")
                .bind(format!("{}%", prefix))
                .fetch_one(&mut *conn)
                .await?;
        Ok(format!("{}{:04}", prefix, count + 1))
    }

    async fn create(&self, conn: &mut PgConnection, new: NewInvoice) -> Result<Invoice> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO billing_records
                (customer_id, billing_type, invoice_type, status, amount_usd_cents,
                 billing_period_start, billing_period_end, due_date, invoice_number, last_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(new.billing_type)
        .bind(new.r#type)
        .bind(new.status)
        .bind(new.amount_usd_cents)
        .bind(new.billing_period_start)
        .bind(new.billing_period_end)
        .bind(new.due_date)
        .bind(&new.invoice_number)
        .fetch_one(conn)
        .await?;
        Ok(invoice)
    }

    async fn update_amount(&self, conn: &mut PgConnection, id: i64, amount_usd_cents: i64) -> Result<()> {
        sqlx::query("UPDATE billing_records SET amount_usd_cents = $2, last_updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(amount_usd_cents)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn update_status(&self, conn: &mut PgConnection, id: i64, status: InvoiceStatus) -> Result<()> {
        sqlx::query("UPDATE billing_records SET status = $2, last_updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn mark_paid(
        &self,
        conn: &mut PgConnection,
        id: i64,
        amount_paid_usd_cents: i64,
        tx_digest: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE billing_records
            SET status = 'paid', amount_paid_usd_cents = $2, tx_digest = $3, last_updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount_paid_usd_cents)
        .bind(tx_digest)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        conn: &mut PgConnection,
        id: i64,
        failure_reason: &str,
        retry_count: i32,
        last_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE billing_records
            SET status = 'failed', failure_reason = $2, retry_count = $3, last_retry_at = $4,
                last_updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(failure_reason)
        .bind(retry_count)
        .bind(last_retry_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn void(&self, conn: &mut PgConnection, id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE billing_records SET status = 'voided', failure_reason = $2, last_updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn delete_unpaid(&self, conn: &mut PgConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
        sqlx::query("DELETE FROM invoice_payments WHERE invoice_id = $1").bind(id).execute(&mut *conn).await?;
        sqlx::query("DELETE FROM billing_records WHERE id = $1").bind(id).execute(conn).await?;
        Ok(())
    }

    async fn list_line_items(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<Vec<InvoiceLineItem>> {
        let rows = sqlx::query_as::<_, InvoiceLineItem>(
            "SELECT * FROM invoice_line_items WHERE invoice_id = $1 ORDER BY id",
        )
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn insert_line_item(&self, conn: &mut PgConnection, item: NewLineItem) -> Result<InvoiceLineItem> {
        let row = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            INSERT INTO invoice_line_items
                (invoice_id, item_type, service_type, quantity, unit_price_usd_cents, amount_usd_cents, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(item.invoice_id)
        .bind(item.item_type)
        .bind(&item.service_type)
        .bind(item.quantity)
        .bind(item.unit_price_usd_cents)
        .bind(item.amount_usd_cents)
        .bind(&item.description)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    async fn delete_non_usage_line_items(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1 AND item_type <> $2")
            .bind(invoice_id)
            .bind(ItemType::Requests)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn delete_line_items_of_type(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        item_type: ItemType,
    ) -> Result<()> {
        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1 AND item_type = $2")
            .bind(invoice_id)
            .bind(item_type)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn insert_payment(&self, conn: &mut PgConnection, payment: NewInvoicePayment) -> Result<InvoicePayment> {
        let row = sqlx::query_as::<_, InvoicePayment>(
            r#"
            INSERT INTO invoice_payments
                (invoice_id, source_type, credit_id, provider_transaction_id, amount_usd_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(payment.invoice_id)
        .bind(payment.source_type)
        .bind(payment.credit_id)
        .bind(&payment.provider_transaction_id)
        .bind(payment.amount_usd_cents)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    async fn list_payments(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<Vec<InvoicePayment>> {
        let rows = sqlx::query_as::<_, InvoicePayment>(
            "SELECT * FROM invoice_payments WHERE invoice_id = $1 ORDER BY created_at",
        )
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn sum_paid(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<i64> {
        let sum: Option<i64> =
            sqlx::query_scalar("SELECT SUM(amount_usd_cents) FROM invoice_payments WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(conn)
                .await?;
        Ok(sum.unwrap_or(0))
    }

    async fn find_stuck_immediate_pending(
        &self,
        conn: &mut PgConnection,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM billing_records
            WHERE billing_type = 'immediate' AND status = 'pending' AND created_at < $1
            "#,
        )
        .bind(older_than)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn find_failed_retriable(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        max_retries: i32,
        retry_after: DateTime<Utc>,
    ) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM billing_records
            WHERE customer_id = $1 AND status = 'failed' AND retry_count < $2
              AND (last_retry_at IS NULL OR last_retry_at < $3)
            "#,
        )
        .bind(customer_id)
        .bind(max_retries)
        .bind(retry_after)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}
