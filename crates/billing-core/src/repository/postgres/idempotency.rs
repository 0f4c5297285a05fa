use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::IdempotencyRecord;
use crate::repository::traits::IdempotencyRepository;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresIdempotencyRepository;

#[async_trait]
impl IdempotencyRepository for PostgresIdempotencyRepository {
    async fn find(&self, conn: &mut PgConnection, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT * FROM idempotency_records WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    async fn insert(
        &self,
        conn: &mut PgConnection,
        key: &str,
        billing_record_id: Option<i64>,
        response: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_records (id, idempotency_key, billing_record_id, response)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(billing_record_id)
        .bind(response)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn sweep_older_than(&self, conn: &mut PgConnection, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE created_at < $1")
            .bind(cutoff)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
