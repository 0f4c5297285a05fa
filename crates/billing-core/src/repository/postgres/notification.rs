use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::AdminNotification;
use crate::repository::traits::{NewNotification, NotificationRepository};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresNotificationRepository;

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn record(&self, conn: &mut PgConnection, new: NewNotification) -> Result<AdminNotification> {
        let row = sqlx::query_as::<_, AdminNotification>(
            r#"
            INSERT INTO admin_notifications
                (id, severity, category, code, message, details, customer_id, invoice_id, acknowledged)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.severity)
        .bind(&new.category)
        .bind(&new.code)
        .bind(&new.message)
        .bind(&new.details)
        .bind(new.customer_id)
        .bind(new.invoice_id)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }
}
