use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::payment::{ChargeParams, ChargeResult, PaymentProvider, ProviderInfo};
use crate::repository::traits::CustomerRepository;
use crate::Result;

/// A third payment backend with the identical contract, keyed on the
/// customer's wallet identifier rather than an escrow or card handle.
#[async_trait]
pub trait WalletClient: Send + Sync {
    async fn charge(&self, wallet_identifier: &str, amount_usd_cents: i64, idempotency_key: &str) -> Result<ChargeResult>;
}

pub struct WalletProvider {
    pool: PgPool,
    customers: Arc<dyn CustomerRepository>,
    client: Arc<dyn WalletClient>,
}

impl WalletProvider {
    pub fn new(pool: PgPool, customers: Arc<dyn CustomerRepository>, client: Arc<dyn WalletClient>) -> Self {
        Self { pool, customers, client }
    }
}

#[async_trait]
impl PaymentProvider for WalletProvider {
    fn id(&self) -> &'static str {
        "wallet"
    }

    async fn can_pay(&self, customer_id: i32, _amount_usd_cents: i64) -> Result<bool> {
        self.is_configured(customer_id).await
    }

    async fn is_configured(&self, customer_id: i32) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, customer_id).await?;
        Ok(customer.map(|c| !c.wallet_identifier.is_empty()).unwrap_or(false))
    }

    async fn charge(&self, params: ChargeParams) -> Result<ChargeResult> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, params.customer_id).await?;
        let identifier = match customer {
            Some(c) if !c.wallet_identifier.is_empty() => c.wallet_identifier,
            _ => return Ok(ChargeResult::failure("no wallet configured", "NOT_CONFIGURED", false)),
        };
        let key = crate::idempotency::provider_key(params.invoice_id, self.id());
        self.client.charge(&identifier, params.amount_usd_cents, &key).await
    }

    async fn info(&self, customer_id: i32) -> Result<ProviderInfo> {
        let configured = self.is_configured(customer_id).await?;
        Ok(ProviderInfo { provider_id: self.id(), display_name: "Wallet balance".to_string(), configured })
    }
}

/// Simple in-memory wallet client used by tests.
#[derive(Default)]
pub struct InMemoryWalletClient {
    pub always_succeed: bool,
}

#[async_trait]
impl WalletClient for InMemoryWalletClient {
    async fn charge(&self, _wallet_identifier: &str, amount_usd_cents: i64, _idempotency_key: &str) -> Result<ChargeResult> {
        if self.always_succeed {
            Ok(ChargeResult::success(format!("wallet-tx-{}", amount_usd_cents)))
        } else {
            Ok(ChargeResult::failure("insufficient wallet balance", "INSUFFICIENT_FUNDS", true))
        }
    }
}
