use std::sync::Arc;

use sqlx::PgConnection;

use crate::clock::Clock;
use crate::config::DunningConfig;
use crate::models::CustomerStatus;
use crate::repository::traits::{CustomerRepository, ServiceInstanceRepository};
use crate::Result;

/// Start/clear grace and suspend-on-expiry policy (C11).
pub struct GraceService {
    customers: Arc<dyn CustomerRepository>,
    service_instances: Arc<dyn ServiceInstanceRepository>,
    clock: Arc<dyn Clock>,
    dunning: DunningConfig,
}

impl GraceService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        service_instances: Arc<dyn ServiceInstanceRepository>,
        clock: Arc<dyn Clock>,
        dunning: DunningConfig,
    ) -> Self {
        Self { customers, service_instances, clock, dunning }
    }

    /// Only starts a grace window for a customer who has paid before and
    /// isn't already in one.
    pub async fn start_grace_period(&self, conn: &mut PgConnection, customer_id: i32) -> Result<bool> {
        let mut customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("customer {customer_id}")))?;

        if !customer.paid_once || customer.grace_period_start.is_some() {
            return Ok(false);
        }

        customer.grace_period_start = Some(self.clock.today().await?);
        self.customers.update(conn, &customer).await?;
        Ok(true)
    }

    pub async fn clear_grace_period(&self, conn: &mut PgConnection, customer_id: i32) -> Result<()> {
        let mut customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("customer {customer_id}")))?;

        customer.grace_period_start = None;
        customer.grace_period_notified_at = serde_json::json!([]);
        self.customers.update(conn, &customer).await?;
        Ok(())
    }

    pub async fn is_grace_period_expired(&self, conn: &mut PgConnection, customer_id: i32) -> Result<bool> {
        let customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("customer {customer_id}")))?;
        let today = self.clock.today().await?;
        Ok(customer.is_grace_period_expired(today, self.dunning.grace_period_days as u32))
    }

    /// Sets the customer to `suspended` and disables every currently-enabled
    /// service. Returns the count of services disabled.
    pub async fn suspend_customer_for_non_payment(&self, conn: &mut PgConnection, customer_id: i32) -> Result<u32> {
        let mut customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("customer {customer_id}")))?;
        customer.status = CustomerStatus::Suspended;
        self.customers.update(conn, &customer).await?;

        let now = self.clock.now().await?;
        let instances = self.service_instances.list_by_customer(conn, customer_id).await?;
        let mut disabled = 0u32;
        for mut instance in instances {
            if instance.state == crate::models::ServiceState::Enabled {
                instance.state = crate::models::ServiceState::Disabled;
                instance.disabled_at = Some(now);
                self.service_instances.update(conn, &instance).await?;
                disabled += 1;
            }
        }
        Ok(disabled)
    }

    /// Reactivates the account; services are left disabled and must be
    /// manually re-enabled.
    pub async fn resume_customer_account(&self, conn: &mut PgConnection, customer_id: i32) -> Result<()> {
        let mut customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("customer {customer_id}")))?;
        customer.status = CustomerStatus::Active;
        customer.grace_period_start = None;
        customer.grace_period_notified_at = serde_json::json!([]);
        self.customers.update(conn, &customer).await?;
        Ok(())
    }

    /// Batch helper: all customer ids whose grace period has expired,
    /// computed against a connection-wide read (no per-customer lock — the
    /// caller re-checks under each customer's own lock before acting).
    pub async fn find_customers_with_expired_grace(&self, conn: &mut PgConnection) -> Result<Vec<i32>> {
        let today = self.clock.today().await?;
        let ids = self.customers.list_all_ids(conn).await?;
        let mut expired = Vec::new();
        for id in ids {
            if let Some(customer) = self.customers.find_by_id(conn, id).await? {
                if customer.is_grace_period_expired(today, self.dunning.grace_period_days as u32) {
                    expired.push(id);
                }
            }
        }
        Ok(expired)
    }
}
