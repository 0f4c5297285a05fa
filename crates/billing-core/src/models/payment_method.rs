use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Escrow,
    Card,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodStatus {
    Active,
    Inactive,
}

/// Orders the provider chain (C6). Reordering is a customer-owned operation
/// and must happen under the customer lock since the loader reads this
/// table inside the lock too.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomerPaymentMethod {
    pub id: i64,
    pub customer_id: i32,
    pub provider_type: ProviderType,
    pub status: PaymentMethodStatus,
    pub priority: i32,
    pub provider_config: serde_json::Value,
}
