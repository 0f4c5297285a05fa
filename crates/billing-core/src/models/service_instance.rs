use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotProvisioned,
    Enabled,
    Disabled,
    CancellationPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn item_type(&self) -> crate::models::ItemType {
        use crate::models::ItemType;
        match self {
            Tier::Starter => ItemType::SubscriptionStarter,
            Tier::Pro => ItemType::SubscriptionPro,
            Tier::Enterprise => ItemType::SubscriptionEnterprise,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Starter => "Starter",
            Tier::Pro => "Pro",
            Tier::Enterprise => "Enterprise",
        }
    }
}

/// Add-on quantities, the "dynamic config" bag from spec.md §9, modeled as a
/// fixed structure rather than an open map — the recalculator only ever
/// reads these fields. Unit prices travel alongside the quantities (there is
/// no internal add-on price catalog, matching the tier-price design: the
/// caller supplies prices at the API boundary and the engine only persists
/// and re-bills them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub purchased_api_keys: i32,
    #[serde(default)]
    pub api_key_unit_price_usd_cents: i64,
    #[serde(default)]
    pub purchased_seal_keys: i32,
    #[serde(default)]
    pub seal_key_unit_price_usd_cents: i64,
    #[serde(default)]
    pub purchased_packages: i32,
    #[serde(default)]
    pub package_unit_price_usd_cents: i64,
}

/// One row per `(customer, service_type)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceInstance {
    pub id: i64,
    pub customer_id: i32,
    pub service_type: String,
    pub state: ServiceState,
    pub tier: Tier,
    /// On/off toggle; does not affect billing. Existence of the row is what
    /// constitutes "subscribed".
    pub is_user_enabled: bool,
    pub paid_once: bool,
    pub scheduled_tier: Option<Tier>,
    pub scheduled_tier_effective_date: Option<NaiveDate>,
    /// New `current_tier_price_usd_cents` to adopt when the scheduled tier
    /// change takes effect. Only set on the downgrade path; upgrades apply
    /// their price immediately and never populate this field.
    pub scheduled_tier_price_usd_cents: Option<i64>,
    pub cancellation_scheduled_for: Option<NaiveDate>,
    pub cancellation_effective_at: Option<DateTime<Utc>>,
    pub sub_pending_invoice_id: Option<i64>,
    /// Current price for the instance's effective tier, in cents, supplied
    /// by the caller at subscribe/upgrade/downgrade time and persisted here
    /// so the recalculator has a price to read without an internal catalog.
    pub current_tier_price_usd_cents: i64,
    pub config: serde_json::Value,
    pub enabled_at: Option<DateTime<Utc>>,
    pub disabled_at: Option<DateTime<Utc>>,
}

impl ServiceInstance {
    pub fn config(&self) -> InstanceConfig {
        serde_json::from_value(self.config.clone()).unwrap_or_default()
    }

    /// The tier that should be billed right now: the scheduled tier if one
    /// is pending, else the current tier.
    pub fn effective_tier(&self) -> Tier {
        self.scheduled_tier.unwrap_or(self.tier)
    }

    pub fn has_scheduled_cancellation(&self) -> bool {
        self.cancellation_scheduled_for.is_some()
    }

    pub fn has_scheduled_tier_change(&self) -> bool {
        self.scheduled_tier.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_tier_prefers_scheduled() {
        let mut instance = sample();
        instance.tier = Tier::Pro;
        instance.scheduled_tier = Some(Tier::Starter);
        assert_eq!(instance.effective_tier(), Tier::Starter);

        instance.scheduled_tier = None;
        assert_eq!(instance.effective_tier(), Tier::Pro);
    }

    fn sample() -> ServiceInstance {
        ServiceInstance {
            id: 1,
            customer_id: 1,
            service_type: "seal".into(),
            state: ServiceState::Enabled,
            tier: Tier::Starter,
            is_user_enabled: true,
            paid_once: false,
            scheduled_tier: None,
            scheduled_tier_effective_date: None,
            scheduled_tier_price_usd_cents: None,
            cancellation_scheduled_for: None,
            cancellation_effective_at: None,
            sub_pending_invoice_id: None,
            current_tier_price_usd_cents: 900,
            config: serde_json::json!({}),
            enabled_at: None,
            disabled_at: None,
        }
    }
}
