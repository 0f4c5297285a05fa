use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::CustomerCredit;
use crate::repository::traits::{CreditRepository, NewCredit};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresCreditRepository;

#[async_trait]
impl CreditRepository for PostgresCreditRepository {
    async fn list_usable_ordered(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CustomerCredit>> {
        let rows = sqlx::query_as::<_, CustomerCredit>(
            r#"
            SELECT * FROM customer_credits
            WHERE customer_id = $1 AND remaining_amount_usd_cents > 0
              AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY expires_at ASC NULLS LAST
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn decrement_remaining(&self, conn: &mut PgConnection, credit_id: i64, amount: i64) -> Result<()> {
        sqlx::query(
            "UPDATE customer_credits SET remaining_amount_usd_cents = remaining_amount_usd_cents - $2 WHERE id = $1",
        )
        .bind(credit_id)
        .bind(amount)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn create(&self, conn: &mut PgConnection, new: NewCredit) -> Result<CustomerCredit> {
        let row = sqlx::query_as::<_, CustomerCredit>(
            r#"
            INSERT INTO customer_credits
                (customer_id, original_amount_usd_cents, remaining_amount_usd_cents, reason, description,
                 expires_at, campaign_id)
            VALUES ($1, $2, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(new.original_amount_usd_cents)
        .bind(new.reason)
        .bind(&new.description)
        .bind(new.expires_at)
        .bind(&new.campaign_id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    async fn sum_available(&self, conn: &mut PgConnection, customer_id: i32, now: DateTime<Utc>) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(remaining_amount_usd_cents) FROM customer_credits
            WHERE customer_id = $1 AND remaining_amount_usd_cents > 0
              AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_one(conn)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    async fn count_orphaned_reconciliation_credits(&self, conn: &mut PgConnection, customer_id: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM customer_credits c
            WHERE c.customer_id = $1 AND c.reason = 'reconciliation' AND c.remaining_amount_usd_cents > 0
              AND NOT EXISTS (SELECT 1 FROM service_instances si WHERE si.customer_id = c.customer_id)
            "#,
        )
        .bind(customer_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }
}
