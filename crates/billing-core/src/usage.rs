use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgConnection;

use crate::clock::Clock;
use crate::models::{Invoice, ItemType};
use crate::repository::traits::{InvoiceRepository, NewLineItem};
use crate::Result;

/// One `stats_per_hour` row windowed to a single `(customer, service_type)`
/// hour bucket. Already pre-aggregated by the metering pipeline — this
/// crate never computes a per-request price, it only folds what the usage
/// source reports.
#[derive(Debug, Clone)]
pub struct UsageBucket {
    pub service_type: String,
    pub hour_bucket: DateTime<Utc>,
    pub billable_requests: i64,
    pub amount_usd_cents: i64,
}

/// Read-only view over the external per-hour usage table (§6). The engine
/// never writes to this source.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn usage_for_period(
        &self,
        customer_id: i32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<UsageBucket>>;
}

/// Folds aggregated usage into a DRAFT's `requests` line item (C16). Runs at
/// two cadences — authoritative on the 1st as part of monthly billing, and
/// hourly (debounced) to keep the DRAFT visible to customers — plus a
/// force-sync path for tests and admin tools. Never touches any other
/// line-item type.
pub struct UsageService {
    source: Arc<dyn UsageSource>,
    invoices: Arc<dyn InvoiceRepository>,
    clock: Arc<dyn Clock>,
}

impl UsageService {
    pub fn new(source: Arc<dyn UsageSource>, invoices: Arc<dyn InvoiceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { source, invoices, clock }
    }

    /// Unconditional fold, used by the monthly block and by
    /// [`Self::force_sync`]. Replaces the DRAFT's `requests` items with a
    /// fresh aggregate per service_type and bumps the invoice total.
    pub async fn sync_usage_to_draft(&self, conn: &mut PgConnection, draft: &Invoice) -> Result<()> {
        let buckets = self
            .source
            .usage_for_period(draft.customer_id, draft.billing_period_start, draft.billing_period_end)
            .await?;

        self.invoices.delete_line_items_of_type(conn, draft.id, ItemType::Requests).await?;

        let mut by_service: std::collections::BTreeMap<String, (i64, i64)> = std::collections::BTreeMap::new();
        for bucket in buckets {
            let entry = by_service.entry(bucket.service_type).or_insert((0, 0));
            entry.0 += bucket.billable_requests;
            entry.1 += bucket.amount_usd_cents;
        }

        let mut usage_total = 0i64;
        for (service_type, (requests, amount_cents)) in by_service {
            if requests == 0 && amount_cents == 0 {
                continue;
            }
            usage_total += amount_cents;
            self.invoices
                .insert_line_item(
                    conn,
                    NewLineItem {
                        invoice_id: draft.id,
                        item_type: ItemType::Requests,
                        service_type: service_type.clone(),
                        quantity: requests as i32,
                        unit_price_usd_cents: if requests > 0 { amount_cents / requests } else { 0 },
                        amount_usd_cents: amount_cents,
                        description: Some(ItemType::Requests.description(&service_type)),
                    },
                )
                .await?;
        }

        let non_usage_total = draft.amount_usd_cents
            - self
                .invoices
                .list_line_items(conn, draft.id)
                .await?
                .into_iter()
                .filter(|i| i.is_usage_item())
                .map(|i| i.amount_usd_cents)
                .sum::<i64>();
        self.invoices.update_amount(conn, draft.id, non_usage_total + usage_total).await?;
        Ok(())
    }

    /// Hourly cadence, debounced against the DRAFT's own `last_updated_at` so
    /// repeated ticks within the same hour are cheap no-ops.
    pub async fn hourly_sync_if_due(&self, conn: &mut PgConnection, draft: &Invoice) -> Result<bool> {
        let now = self.clock.now().await?;
        if draft.last_updated_at > now - Duration::hours(1) {
            return Ok(false);
        }
        self.sync_usage_to_draft(conn, draft).await?;
        Ok(true)
    }

    /// Explicit, unconditional fold for tests and admin tools.
    pub async fn force_sync(&self, conn: &mut PgConnection, draft: &Invoice) -> Result<()> {
        self.sync_usage_to_draft(conn, draft).await
    }
}

/// In-memory usage source for tests.
#[derive(Default)]
pub struct InMemoryUsageSource {
    buckets: std::sync::Mutex<Vec<(i32, UsageBucket)>>,
}

impl InMemoryUsageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, customer_id: i32, bucket: UsageBucket) {
        self.buckets.lock().unwrap().push((customer_id, bucket));
    }
}

#[async_trait]
impl UsageSource for InMemoryUsageSource {
    async fn usage_for_period(
        &self,
        customer_id: i32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<UsageBucket>> {
        let guard = self.buckets.lock().unwrap();
        Ok(guard
            .iter()
            .filter(|(cid, bucket)| {
                *cid == customer_id
                    && bucket.hour_bucket.date_naive() >= period_start
                    && bucket.hour_bucket.date_naive() <= period_end
            })
            .map(|(_, bucket)| bucket.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_aggregate_by_service_type() {
        let mut by_service: std::collections::BTreeMap<String, (i64, i64)> = std::collections::BTreeMap::new();
        for (service, requests, amount) in [("api", 10i64, 100i64), ("api", 5, 50), ("seal", 2, 20)] {
            let entry = by_service.entry(service.to_string()).or_insert((0, 0));
            entry.0 += requests;
            entry.1 += amount;
        }
        assert_eq!(by_service.get("api"), Some(&(15, 150)));
        assert_eq!(by_service.get("seal"), Some(&(2, 20)));
    }
}
