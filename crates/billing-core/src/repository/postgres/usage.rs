use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::{FromRow, PgPool};

use crate::usage::{UsageBucket, UsageSource};
use crate::Result;

#[derive(Debug, FromRow)]
struct StatsPerHourRow {
    service_type: String,
    hour_bucket: chrono::DateTime<Utc>,
    billable_requests: i64,
    unit_price_usd_cents: i64,
}

/// Reads the metering pipeline's pre-aggregated `stats_per_hour` table (§6).
/// Holds its own pool since [`UsageSource::usage_for_period`] isn't handed a
/// connection — usage folding runs outside the customer transaction that
/// produced it.
pub struct PostgresUsageSource {
    pool: PgPool,
}

impl PostgresUsageSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageSource for PostgresUsageSource {
    async fn usage_for_period(
        &self,
        customer_id: i32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<UsageBucket>> {
        let range_start = Utc.from_utc_datetime(&period_start.and_hms_opt(0, 0, 0).expect("valid time"));
        let range_end = Utc.from_utc_datetime(&period_end.and_hms_opt(23, 59, 59).expect("valid time"));

        let rows = sqlx::query_as::<_, StatsPerHourRow>(
            r#"
            SELECT service_type, hour_bucket, billable_requests, unit_price_usd_cents
            FROM stats_per_hour
            WHERE customer_id = $1 AND hour_bucket BETWEEN $2 AND $3
            "#,
        )
        .bind(customer_id)
        .bind(range_start)
        .bind(range_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UsageBucket {
                service_type: row.service_type,
                hour_bucket: row.hour_bucket,
                billable_requests: row.billable_requests,
                amount_usd_cents: row.billable_requests * row.unit_price_usd_cents,
            })
            .collect())
    }
}
