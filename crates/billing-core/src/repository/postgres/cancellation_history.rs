use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::ServiceCancellationHistory;
use crate::repository::traits::{CancellationHistoryRepository, NewCancellationHistory};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresCancellationHistoryRepository;

#[async_trait]
impl CancellationHistoryRepository for PostgresCancellationHistoryRepository {
    async fn insert(
        &self,
        conn: &mut PgConnection,
        new: NewCancellationHistory,
    ) -> Result<ServiceCancellationHistory> {
        let row = sqlx::query_as::<_, ServiceCancellationHistory>(
            r#"
            INSERT INTO service_cancellation_history
                (customer_id, service_type, previous_tier, billing_period_ended_at, deleted_at, cooldown_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(&new.service_type)
        .bind(new.previous_tier)
        .bind(new.billing_period_ended_at)
        .bind(new.deleted_at)
        .bind(new.cooldown_expires_at)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    async fn find_active_cooldown(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceCancellationHistory>> {
        let row = sqlx::query_as::<_, ServiceCancellationHistory>(
            r#"
            SELECT * FROM service_cancellation_history
            WHERE customer_id = $1 AND service_type = $2 AND cooldown_expires_at > $3
            ORDER BY cooldown_expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .bind(service_type)
        .bind(now)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    async fn sweep_older_than(&self, conn: &mut PgConnection, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM service_cancellation_history WHERE deleted_at < $1")
            .bind(cutoff)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
