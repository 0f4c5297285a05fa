use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::payment::{ChargeParams, ChargeResult, PaymentProvider, ProviderInfo};
use crate::repository::traits::CustomerRepository;
use crate::Result;

/// The on-chain escrow client, abstracted behind a trait per spec.md §1 —
/// its implementation is an external collaborator outside this crate.
#[async_trait]
pub trait EscrowClient: Send + Sync {
    async fn balance(&self, escrow_handle: &str) -> Result<i64>;
    async fn charge(&self, escrow_handle: &str, amount_usd_cents: i64, idempotency_key: &str) -> Result<ChargeResult>;
}

pub struct EscrowProvider {
    pool: PgPool,
    customers: Arc<dyn CustomerRepository>,
    client: Arc<dyn EscrowClient>,
}

impl EscrowProvider {
    pub fn new(pool: PgPool, customers: Arc<dyn CustomerRepository>, client: Arc<dyn EscrowClient>) -> Self {
        Self { pool, customers, client }
    }
}

#[async_trait]
impl PaymentProvider for EscrowProvider {
    fn id(&self) -> &'static str {
        "escrow"
    }

    async fn can_pay(&self, customer_id: i32, amount_usd_cents: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, customer_id).await?;
        Ok(match customer {
            Some(c) if c.escrow_account_handle.is_some() => c.current_balance_usd_cents >= amount_usd_cents,
            _ => false,
        })
    }

    async fn is_configured(&self, customer_id: i32) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, customer_id).await?;
        Ok(customer.and_then(|c| c.escrow_account_handle).is_some())
    }

    async fn charge(&self, params: ChargeParams) -> Result<ChargeResult> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, params.customer_id).await?;
        let handle = match customer.and_then(|c| c.escrow_account_handle) {
            Some(h) => h,
            None => return Ok(ChargeResult::failure("no escrow account configured", "NOT_CONFIGURED", false)),
        };
        let key = crate::idempotency::provider_key(params.invoice_id, self.id());
        self.client.charge(&handle, params.amount_usd_cents, &key).await
    }

    async fn info(&self, customer_id: i32) -> Result<ProviderInfo> {
        let configured = self.is_configured(customer_id).await?;
        Ok(ProviderInfo { provider_id: self.id(), display_name: "Escrow balance".to_string(), configured })
    }
}

/// Simple in-memory escrow client used by tests.
#[derive(Default)]
pub struct InMemoryEscrowClient {
    pub always_succeed: bool,
}

#[async_trait]
impl EscrowClient for InMemoryEscrowClient {
    async fn balance(&self, _escrow_handle: &str) -> Result<i64> {
        Ok(0)
    }

    async fn charge(&self, _escrow_handle: &str, amount_usd_cents: i64, _idempotency_key: &str) -> Result<ChargeResult> {
        if self.always_succeed {
            Ok(ChargeResult::success(format!("escrow-tx-{}", amount_usd_cents)))
        } else {
            Ok(ChargeResult::failure("insufficient escrow balance", "INSUFFICIENT_FUNDS", true))
        }
    }
}
