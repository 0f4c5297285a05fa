use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;

use crate::models::ServiceInstance;
use crate::repository::traits::{NewServiceInstance, ServiceInstanceRepository};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresServiceInstanceRepository;

#[async_trait]
impl ServiceInstanceRepository for PostgresServiceInstanceRepository {
    async fn find(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
    ) -> Result<Option<ServiceInstance>> {
        let instance = sqlx::query_as::<_, ServiceInstance>(
            "SELECT * FROM service_instances WHERE customer_id = $1 AND service_type = $2",
        )
        .bind(customer_id)
        .bind(service_type)
        .fetch_optional(conn)
        .await?;
        Ok(instance)
    }

    async fn find_by_id(&self, conn: &mut PgConnection, id: i64) -> Result<Option<ServiceInstance>> {
        let instance = sqlx::query_as::<_, ServiceInstance>("SELECT * FROM service_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(instance)
    }

    async fn list_by_customer(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Vec<ServiceInstance>> {
        let rows = sqlx::query_as::<_, ServiceInstance>(
            "SELECT * FROM service_instances WHERE customer_id = $1 ORDER BY id",
        )
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn create(&self, conn: &mut PgConnection, new: NewServiceInstance) -> Result<ServiceInstance> {
        let instance = sqlx::query_as::<_, ServiceInstance>(
            r#"
            INSERT INTO service_instances
                (customer_id, service_type, state, tier, current_tier_price_usd_cents, config,
                 sub_pending_invoice_id, is_user_enabled, paid_once, enabled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, FALSE, now())
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(&new.service_type)
        .bind(new.state)
        .bind(new.tier)
        .bind(new.current_tier_price_usd_cents)
        .bind(&new.config)
        .bind(new.sub_pending_invoice_id)
        .fetch_one(conn)
        .await?;
        Ok(instance)
    }

    async fn update(&self, conn: &mut PgConnection, instance: &ServiceInstance) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE service_instances SET
                state = $2,
                tier = $3,
                is_user_enabled = $4,
                paid_once = $5,
                scheduled_tier = $6,
                scheduled_tier_effective_date = $7,
                scheduled_tier_price_usd_cents = $8,
                cancellation_scheduled_for = $9,
                cancellation_effective_at = $10,
                sub_pending_invoice_id = $11,
                current_tier_price_usd_cents = $12,
                config = $13,
                enabled_at = $14,
                disabled_at = $15
            WHERE id = $1
            "#,
        )
        .bind(instance.id)
        .bind(instance.state)
        .bind(instance.tier)
        .bind(instance.is_user_enabled)
        .bind(instance.paid_once)
        .bind(instance.scheduled_tier)
        .bind(instance.scheduled_tier_effective_date)
        .bind(instance.scheduled_tier_price_usd_cents)
        .bind(instance.cancellation_scheduled_for)
        .bind(instance.cancellation_effective_at)
        .bind(instance.sub_pending_invoice_id)
        .bind(instance.current_tier_price_usd_cents)
        .bind(&instance.config)
        .bind(instance.enabled_at)
        .bind(instance.disabled_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn delete(&self, conn: &mut PgConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM service_instances WHERE id = $1").bind(id).execute(conn).await?;
        Ok(())
    }

    async fn find_scheduled_tier_due(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        today: NaiveDate,
    ) -> Result<Vec<ServiceInstance>> {
        let rows = sqlx::query_as::<_, ServiceInstance>(
            r#"
            SELECT * FROM service_instances
            WHERE customer_id = $1 AND scheduled_tier_effective_date IS NOT NULL
              AND scheduled_tier_effective_date <= $2
            "#,
        )
        .bind(customer_id)
        .bind(today)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn find_scheduled_cancellation_due(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        today: NaiveDate,
    ) -> Result<Vec<ServiceInstance>> {
        let rows = sqlx::query_as::<_, ServiceInstance>(
            r#"
            SELECT * FROM service_instances
            WHERE customer_id = $1 AND cancellation_scheduled_for IS NOT NULL
              AND cancellation_scheduled_for <= $2
            "#,
        )
        .bind(customer_id)
        .bind(today)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn find_cancellation_pending_due(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceInstance>> {
        let rows = sqlx::query_as::<_, ServiceInstance>(
            r#"
            SELECT * FROM service_instances
            WHERE state = 'cancellation_pending' AND cancellation_effective_at IS NOT NULL
              AND cancellation_effective_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn find_active_by_cooldown_scope(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
    ) -> Result<Option<ServiceInstance>> {
        self.find(conn, customer_id, service_type).await
    }
}
