pub mod chain;
pub mod processor;
pub mod providers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone)]
pub struct ChargeParams {
    pub customer_id: i32,
    pub invoice_id: i64,
    pub amount_usd_cents: i64,
}

/// Outcome of a single provider charge attempt (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResult {
    pub success: bool,
    pub provider_reference: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// When `false`, the chain moves on to the next provider instead of
    /// treating the failure as final.
    pub retryable: bool,
    /// Set when the provider requires an out-of-band action (e.g. card
    /// 3-D-Secure); `success=false, retryable=false` in that case.
    pub hosted_redirect_url: Option<String>,
}

impl ChargeResult {
    pub fn success(provider_reference: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_reference: Some(provider_reference.into()),
            error: None,
            error_code: None,
            retryable: false,
            hosted_redirect_url: None,
        }
    }

    pub fn failure(error: impl Into<String>, error_code: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            provider_reference: None,
            error: Some(error.into()),
            error_code: Some(error_code.into()),
            retryable,
            hosted_redirect_url: None,
        }
    }

    pub fn requires_action(hosted_redirect_url: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_reference: None,
            error: Some("requires customer action".to_string()),
            error_code: Some("REQUIRES_ACTION".to_string()),
            retryable: false,
            hosted_redirect_url: Some(hosted_redirect_url.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_id: &'static str,
    pub display_name: String,
    pub configured: bool,
}

/// Uniform interface over escrow/card/wallet backends (C6). Concrete
/// variants share this contract exactly; `is_configured`/`can_pay` let the
/// chain skip providers that can't possibly succeed without making a network
/// call.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn id(&self) -> &'static str;

    async fn can_pay(&self, customer_id: i32, amount_usd_cents: i64) -> Result<bool>;

    async fn is_configured(&self, customer_id: i32) -> Result<bool>;

    async fn charge(&self, params: ChargeParams) -> Result<ChargeResult>;

    async fn info(&self, customer_id: i32) -> Result<ProviderInfo>;
}
