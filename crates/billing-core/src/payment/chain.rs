use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgConnection;

use crate::models::ProviderType;
use crate::payment::PaymentProvider;
use crate::repository::traits::PaymentMethodRepository;
use crate::Result;

/// Holds one shared instance per provider variant; the chain loader maps
/// `customer_payment_methods` rows onto these instances in priority order.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn with_provider(mut self, provider_type: ProviderType, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider_type, provider);
        self
    }

    pub fn get(&self, provider_type: ProviderType) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&provider_type).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads active payment methods ordered by `priority` ascending and returns
/// one provider instance per row, in that order. Must run inside the
/// customer lock (C6) to prevent races with reordering.
pub async fn load_provider_chain(
    conn: &mut PgConnection,
    payment_methods: &dyn PaymentMethodRepository,
    registry: &ProviderRegistry,
    customer_id: i32,
) -> Result<Vec<Arc<dyn PaymentProvider>>> {
    let methods = payment_methods.list_active_ordered(conn, customer_id).await?;
    Ok(methods.into_iter().filter_map(|m| registry.get(m.provider_type)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{ChargeResult, ProviderInfo};
    use async_trait::async_trait;

    struct StubProvider(&'static str);

    #[async_trait]
    impl PaymentProvider for StubProvider {
        fn id(&self) -> &'static str {
            self.0
        }

        async fn can_pay(&self, _customer_id: i32, _amount_usd_cents: i64) -> Result<bool> {
            Ok(true)
        }

        async fn is_configured(&self, _customer_id: i32) -> Result<bool> {
            Ok(true)
        }

        async fn charge(&self, _params: crate::payment::ChargeParams) -> Result<ChargeResult> {
            Ok(ChargeResult::success("tx"))
        }

        async fn info(&self, _customer_id: i32) -> Result<ProviderInfo> {
            Ok(ProviderInfo { provider_id: self.0, display_name: self.0.to_string(), configured: true })
        }
    }

    #[test]
    fn unregistered_provider_type_yields_none() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(ProviderType::Escrow).is_none());
    }

    #[test]
    fn with_provider_registers_exactly_that_variant() {
        let registry = ProviderRegistry::new()
            .with_provider(ProviderType::Escrow, Arc::new(StubProvider("escrow")));

        assert!(registry.get(ProviderType::Escrow).is_some());
        assert!(registry.get(ProviderType::Card).is_none());
        assert_eq!(registry.get(ProviderType::Escrow).unwrap().id(), "escrow");
    }

    #[test]
    fn later_registration_for_same_variant_replaces_the_earlier_one() {
        let registry = ProviderRegistry::new()
            .with_provider(ProviderType::Card, Arc::new(StubProvider("first")))
            .with_provider(ProviderType::Card, Arc::new(StubProvider("second")));

        assert_eq!(registry.get(ProviderType::Card).unwrap().id(), "second");
    }
}
