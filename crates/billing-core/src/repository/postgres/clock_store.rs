use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::clock::MockClockStore;
use crate::Result;

/// Backs [`crate::clock::MockClock`] with the shared `test_kv` row so a
/// request handler and the periodic worker process agree on simulated time
/// (spec.md §6), instead of each holding its own process-local value.
pub struct PostgresClockStore {
    pool: PgPool,
}

impl PostgresClockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MockClockStore for PostgresClockStore {
    async fn read(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let value = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT value FROM test_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO test_kv (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
