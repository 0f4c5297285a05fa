use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::clock::Clock;
use crate::locking::CustomerLock;
use crate::models::{cooldown_expiry, ServiceState, Tier};
use crate::repository::traits::{CancellationHistoryRepository, NewCancellationHistory, ServiceInstanceRepository};
use crate::Result;

/// Deletes per-customer subscription artifacts once a scheduled
/// cancellation's grace period has elapsed (C13).
pub struct CleanupService {
    pool: PgPool,
    lock: CustomerLock,
    service_instances: Arc<dyn ServiceInstanceRepository>,
    cancellation_history: Arc<dyn CancellationHistoryRepository>,
    clock: Arc<dyn Clock>,
}

impl CleanupService {
    pub fn new(
        pool: PgPool,
        lock: CustomerLock,
        service_instances: Arc<dyn ServiceInstanceRepository>,
        cancellation_history: Arc<dyn CancellationHistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pool, lock, service_instances, cancellation_history, clock }
    }

    /// Global scan for instances whose grace period has elapsed, each then
    /// re-processed under its own customer lock.
    pub async fn run(&self) -> Result<u32> {
        let now = self.clock.now().await?;
        let mut conn = self.pool.acquire().await?;
        let due = self.service_instances.find_cancellation_pending_due(&mut conn, now).await?;
        drop(conn);

        let mut processed = 0u32;
        for instance in due {
            let customer_id = instance.customer_id;
            let service_type = instance.service_type.clone();
            self.lock
                .with_customer_lock(customer_id, |mut tx| {
                    let service_type = service_type.clone();
                    async move {
                        self.cleanup_one(&mut tx, customer_id, &service_type).await?;
                        Ok((tx, ()))
                    }
                })
                .await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn cleanup_one(&self, conn: &mut sqlx::PgConnection, customer_id: i32, service_type: &str) -> Result<()> {
        let instance = match self.service_instances.find(conn, customer_id, service_type).await? {
            Some(i) if i.state == ServiceState::CancellationPending => i,
            _ => return Ok(()),
        };

        let now = self.clock.now().await?;
        let billing_period_ended_at = instance.cancellation_effective_at.unwrap_or(now);

        self.cancellation_history
            .insert(
                conn,
                NewCancellationHistory {
                    customer_id,
                    service_type: service_type.to_string(),
                    previous_tier: instance.tier,
                    billing_period_ended_at,
                    deleted_at: now,
                    cooldown_expires_at: cooldown_expiry(now),
                },
            )
            .await?;

        // Per-customer API keys and service-specific packages live outside
        // this crate's data model (the key-management/provisioning surface
        // is an external collaborator per spec.md §1); deletion there is
        // triggered by this event but performed by that collaborator.

        let mut reset = instance.clone();
        reset.state = ServiceState::NotProvisioned;
        reset.tier = Tier::Starter;
        reset.is_user_enabled = true;
        reset.config = serde_json::Value::Null;
        reset.cancellation_scheduled_for = None;
        reset.cancellation_effective_at = None;
        reset.scheduled_tier = None;
        reset.scheduled_tier_effective_date = None;
        reset.scheduled_tier_price_usd_cents = None;
        reset.sub_pending_invoice_id = None;
        reset.enabled_at = None;
        reset.disabled_at = None;
        self.service_instances.update(conn, &reset).await?;

        info!(customer_id, service_type, "cancellation cleanup completed, instance reset to not_provisioned");
        Ok(())
    }
}
