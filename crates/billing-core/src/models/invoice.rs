use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    Periodic,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Charge,
    Credit,
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Failed,
    Voided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    SubscriptionStarter,
    SubscriptionPro,
    SubscriptionEnterprise,
    ExtraApiKeys,
    ExtraSealKeys,
    ExtraPackages,
    TierUpgrade,
    Requests,
}

impl ItemType {
    /// Billing-history description, derived from the item_type rather than
    /// any free-text field on the invoice (spec.md §9: "implicit coupling
    /// via invoice line items").
    pub fn description(&self, service_type: &str) -> String {
        match self {
            ItemType::SubscriptionStarter => format!("{} Starter tier subscription", capitalize(service_type)),
            ItemType::SubscriptionPro => format!("{} Pro tier subscription", capitalize(service_type)),
            ItemType::SubscriptionEnterprise => format!("{} Enterprise tier subscription", capitalize(service_type)),
            ItemType::ExtraApiKeys => format!("{} additional API keys", capitalize(service_type)),
            ItemType::ExtraSealKeys => format!("{} additional seal keys", capitalize(service_type)),
            ItemType::ExtraPackages => format!("{} additional packages", capitalize(service_type)),
            ItemType::TierUpgrade => format!("{} tier upgrade", capitalize(service_type)),
            ItemType::Requests => format!("{} usage (requests)", capitalize(service_type)),
        }
    }

    pub fn for_tier(tier: crate::models::Tier) -> Self {
        tier.item_type()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentSourceType {
    Credit,
    EscrowProvider,
    CardProvider,
    WalletProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub customer_id: i32,
    pub billing_type: BillingType,
    #[sqlx(rename = "invoice_type")]
    pub r#type: InvoiceType,
    pub status: InvoiceStatus,
    pub amount_usd_cents: i64,
    pub amount_paid_usd_cents: i64,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_number: String,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub last_updated_at: DateTime<Utc>,
    pub tx_digest: Option<String>,
}

impl Invoice {
    pub fn remaining_cents(&self) -> i64 {
        (self.amount_usd_cents - self.amount_paid_usd_cents).max(0)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.amount_paid_usd_cents >= self.amount_usd_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceLineItem {
    pub id: i64,
    pub invoice_id: i64,
    pub item_type: ItemType,
    pub service_type: String,
    pub quantity: i32,
    pub unit_price_usd_cents: i64,
    pub amount_usd_cents: i64,
    pub description: Option<String>,
}

impl InvoiceLineItem {
    /// `requests` items are owned by the usage subsystem (C16); every other
    /// item_type belongs to the draft recalculator (C9) and gets wiped and
    /// rewritten on every recalculation.
    pub fn is_usage_item(&self) -> bool {
        matches!(self.item_type, ItemType::Requests)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoicePayment {
    pub id: i64,
    pub invoice_id: i64,
    pub source_type: PaymentSourceType,
    pub credit_id: Option<i64>,
    pub provider_transaction_id: Option<String>,
    pub amount_usd_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_uses_item_type_not_invoice() {
        assert_eq!(
            ItemType::SubscriptionEnterprise.description("seal"),
            "Seal Enterprise tier subscription"
        );
    }
}
