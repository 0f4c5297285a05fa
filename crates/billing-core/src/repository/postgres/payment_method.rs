use async_trait::async_trait;
use sqlx::PgConnection;

use crate::models::CustomerPaymentMethod;
use crate::repository::traits::PaymentMethodRepository;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresPaymentMethodRepository;

#[async_trait]
impl PaymentMethodRepository for PostgresPaymentMethodRepository {
    async fn list_active_ordered(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
    ) -> Result<Vec<CustomerPaymentMethod>> {
        let rows = sqlx::query_as::<_, CustomerPaymentMethod>(
            r#"
            SELECT * FROM customer_payment_methods
            WHERE customer_id = $1 AND status = 'active'
            ORDER BY priority ASC
            "#,
        )
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }
}
