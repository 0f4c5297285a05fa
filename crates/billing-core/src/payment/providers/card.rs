use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::payment::{ChargeParams, ChargeResult, PaymentProvider, ProviderInfo};
use crate::repository::traits::CustomerRepository;
use crate::Result;

/// The card-network client, abstracted per spec.md §1 — its implementation
/// is an external collaborator outside this crate.
#[async_trait]
pub trait CardClient: Send + Sync {
    async fn charge(&self, card_handle: &str, amount_usd_cents: i64, idempotency_key: &str) -> Result<ChargeResult>;
}

pub struct CardProvider {
    pool: PgPool,
    customers: Arc<dyn CustomerRepository>,
    client: Arc<dyn CardClient>,
}

impl CardProvider {
    pub fn new(pool: PgPool, customers: Arc<dyn CustomerRepository>, client: Arc<dyn CardClient>) -> Self {
        Self { pool, customers, client }
    }
}

#[async_trait]
impl PaymentProvider for CardProvider {
    fn id(&self) -> &'static str {
        "card"
    }

    /// For card, `can_pay` only confirms the provider is configured — the
    /// network itself decides authorization at charge time.
    async fn can_pay(&self, customer_id: i32, _amount_usd_cents: i64) -> Result<bool> {
        self.is_configured(customer_id).await
    }

    async fn is_configured(&self, customer_id: i32) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, customer_id).await?;
        Ok(customer.and_then(|c| c.card_provider_handle).is_some())
    }

    async fn charge(&self, params: ChargeParams) -> Result<ChargeResult> {
        let mut conn = self.pool.acquire().await?;
        let customer = self.customers.find_by_id(&mut conn, params.customer_id).await?;
        let handle = match customer.and_then(|c| c.card_provider_handle) {
            Some(h) => h,
            None => return Ok(ChargeResult::failure("no card on file", "NOT_CONFIGURED", false)),
        };
        let key = crate::idempotency::provider_key(params.invoice_id, self.id());
        self.client.charge(&handle, params.amount_usd_cents, &key).await
    }

    async fn info(&self, customer_id: i32) -> Result<ProviderInfo> {
        let configured = self.is_configured(customer_id).await?;
        Ok(ProviderInfo { provider_id: self.id(), display_name: "Card on file".to_string(), configured })
    }
}

/// Simple in-memory card client used by tests; can simulate a 3-D-Secure
/// hosted-redirect outcome.
pub enum InMemoryCardOutcome {
    Succeed,
    Decline,
    RequiresAction(String),
}

pub struct InMemoryCardClient {
    pub outcome: InMemoryCardOutcome,
}

#[async_trait]
impl CardClient for InMemoryCardClient {
    async fn charge(&self, _card_handle: &str, amount_usd_cents: i64, _idempotency_key: &str) -> Result<ChargeResult> {
        match &self.outcome {
            InMemoryCardOutcome::Succeed => Ok(ChargeResult::success(format!("card-tx-{}", amount_usd_cents))),
            InMemoryCardOutcome::Decline => Ok(ChargeResult::failure("card declined", "CARD_DECLINED", true)),
            InMemoryCardOutcome::RequiresAction(url) => Ok(ChargeResult::requires_action(url.clone())),
        }
    }
}
