use async_trait::async_trait;
use sqlx::PgConnection;

use crate::models::Customer;
use crate::repository::traits::CustomerRepository;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresCustomerRepository;

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn find_by_id(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
        Ok(customer)
    }

    async fn update(&self, conn: &mut PgConnection, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers SET
                wallet_identifier = $2,
                escrow_account_handle = $3,
                status = $4,
                spending_limit_usd_cents = $5,
                current_balance_usd_cents = $6,
                current_period_charged_usd_cents = $7,
                current_period_start = $8,
                card_provider_handle = $9,
                paid_once = $10,
                grace_period_start = $11,
                grace_period_notified_at = $12
            WHERE customer_id = $1
            "#,
        )
        .bind(customer.customer_id)
        .bind(&customer.wallet_identifier)
        .bind(&customer.escrow_account_handle)
        .bind(customer.status)
        .bind(customer.spending_limit_usd_cents)
        .bind(customer.current_balance_usd_cents)
        .bind(customer.current_period_charged_usd_cents)
        .bind(customer.current_period_start)
        .bind(&customer.card_provider_handle)
        .bind(customer.paid_once)
        .bind(customer.grace_period_start)
        .bind(&customer.grace_period_notified_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn list_all_ids(&self, conn: &mut PgConnection) -> Result<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar("SELECT customer_id FROM customers ORDER BY customer_id")
            .fetch_all(conn)
            .await?;
        Ok(ids)
    }
}
