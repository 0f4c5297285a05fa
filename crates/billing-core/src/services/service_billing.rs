use std::sync::Arc;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::clock::{days_in_month, Clock};
use crate::credits::CreditService;
use crate::invoices::{CreateImmediateInvoiceParams, InvoiceService, LineItemParams};
use crate::models::{CreditReason, Invoice, ItemType, ServiceInstance, Tier};
use crate::payment::processor::PaymentProcessor;
use crate::payment::PaymentProvider;
use crate::repository::traits::{CustomerRepository, ServiceInstanceRepository};
use crate::validation::InvoiceValidator;
use crate::Result;

/// Outcome of [`ServiceBillingService::handle_subscription_billing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBillingOutcome {
    pub invoice_id: i64,
    pub amount_usd_cents: i64,
    pub payment_successful: bool,
    pub sub_pending_invoice_id: Option<i64>,
    pub error: Option<String>,
}

/// Translates subscribe/upgrade events into invoices and credits (C9).
#[derive(Clone)]
pub struct ServiceBillingService {
    invoices: InvoiceService,
    credits: CreditService,
    payments: PaymentProcessor,
    customers: Arc<dyn CustomerRepository>,
    service_instances: Arc<dyn ServiceInstanceRepository>,
    validator: InvoiceValidator,
    clock: Arc<dyn Clock>,
}

impl ServiceBillingService {
    pub fn new(
        invoices: InvoiceService,
        credits: CreditService,
        payments: PaymentProcessor,
        customers: Arc<dyn CustomerRepository>,
        service_instances: Arc<dyn ServiceInstanceRepository>,
        validator: InvoiceValidator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { invoices, credits, payments, customers, service_instances, validator, clock }
    }

    /// First-month charge for a freshly subscribed service instance. Must run
    /// under the customer lock.
    pub async fn handle_subscription_billing(
        &self,
        conn: &mut PgConnection,
        instance: &ServiceInstance,
        monthly_price_usd_cents: i64,
        providers: &[Arc<dyn PaymentProvider>],
    ) -> Result<ServiceBillingOutcome> {
        let invoice = self
            .invoices
            .create_and_charge_immediately(
                conn,
                CreateImmediateInvoiceParams {
                    customer_id: instance.customer_id,
                    amount_usd_cents: monthly_price_usd_cents,
                    line_items: vec![LineItemParams {
                        item_type: instance.tier.item_type(),
                        service_type: instance.service_type.clone(),
                        quantity: 1,
                        unit_price_usd_cents: monthly_price_usd_cents,
                        amount_usd_cents: monthly_price_usd_cents,
                    }],
                },
            )
            .await?;

        let outcome = self.payments.process_invoice_payment(conn, invoice.id, providers).await?;

        if outcome.fully_paid {
            let mut customer = self
                .customers
                .find_by_id(conn, instance.customer_id)
                .await?
                .ok_or_else(|| crate::Error::not_found(format!("customer {}", instance.customer_id)))?;
            customer.paid_once = true;
            self.customers.update(conn, &customer).await?;

            let mut updated_instance = instance.clone();
            updated_instance.paid_once = true;
            updated_instance.sub_pending_invoice_id = None;
            self.service_instances.update(conn, &updated_instance).await?;

            self.issue_partial_month_credit(conn, instance, monthly_price_usd_cents).await?;
            self.recalculate_draft_invoice(conn, instance.customer_id).await?;
        }

        Ok(ServiceBillingOutcome {
            invoice_id: invoice.id,
            amount_usd_cents: monthly_price_usd_cents,
            payment_successful: outcome.fully_paid,
            sub_pending_invoice_id: if outcome.fully_paid { None } else { Some(invoice.id) },
            error: outcome.error,
        })
    }

    /// `floor(price × days_not_used / days_in_month)`, applied once a
    /// first-month charge succeeds, refunding the portion of the month
    /// already elapsed before the subscription started.
    async fn issue_partial_month_credit(
        &self,
        conn: &mut PgConnection,
        instance: &ServiceInstance,
        price_usd_cents: i64,
    ) -> Result<()> {
        let today = self.clock.today().await?;
        let in_month = days_in_month(today) as i64;
        let day_of_month = today.day() as i64;
        let days_used = in_month - day_of_month + 1;
        let days_not_used = in_month - days_used;

        if price_usd_cents == 0 || days_not_used == 0 {
            return Ok(());
        }

        let credit_cents = (price_usd_cents * days_not_used) / in_month;
        if credit_cents <= 0 {
            return Ok(());
        }

        self.credits
            .issue_credit(
                conn,
                instance.customer_id,
                credit_cents,
                CreditReason::Reconciliation,
                Some(format!("partial-month credit for {} subscribed mid-cycle", instance.service_type)),
                None,
                None,
            )
            .await?;
        Ok(())
    }

    /// The single idempotent entry point called whenever anything affecting
    /// next-month billing changes. Wipes and rewrites every subscription/
    /// add-on line item; leaves `requests` usage items untouched.
    pub async fn recalculate_draft_invoice(&self, conn: &mut PgConnection, customer_id: i32) -> Result<Invoice> {
        let draft = self.invoices.get_or_create_draft(conn, customer_id).await?;
        self.invoices.repo().delete_non_usage_line_items(conn, draft.id).await?;

        let instances = self.service_instances.list_by_customer(conn, customer_id).await?;
        let mut total = self.requests_total(conn, draft.id).await?;

        for instance in instances
            .iter()
            .filter(|i| !i.has_scheduled_cancellation() && i.state != crate::models::ServiceState::CancellationPending)
        {
            let tier = instance.effective_tier();
            total += self
                .insert_subscription_item(conn, draft.id, instance, tier)
                .await?;
            total += self.insert_addon_items(conn, draft.id, instance).await?;
        }

        self.invoices.update_draft_amount(conn, draft.id, total).await?;
        self.validator.ensure_invoice_valid(conn, draft.id).await?;
        self.invoices
            .repo()
            .find_by_id(conn, draft.id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("invoice {}", draft.id)))
    }

    async fn requests_total(&self, conn: &mut PgConnection, invoice_id: i64) -> Result<i64> {
        Ok(self
            .invoices
            .repo()
            .list_line_items(conn, invoice_id)
            .await?
            .into_iter()
            .filter(|i| i.is_usage_item())
            .map(|i| i.amount_usd_cents)
            .sum())
    }

    async fn insert_subscription_item(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        instance: &ServiceInstance,
        tier: Tier,
    ) -> Result<i64> {
        let price = instance.current_tier_price_usd_cents;
        self.invoices
            .repo()
            .insert_line_item(
                conn,
                crate::repository::traits::NewLineItem {
                    invoice_id,
                    item_type: tier.item_type(),
                    service_type: instance.service_type.clone(),
                    quantity: 1,
                    unit_price_usd_cents: price,
                    amount_usd_cents: price,
                    description: Some(tier.item_type().description(&instance.service_type)),
                },
            )
            .await?;
        Ok(price)
    }

    async fn insert_addon_items(
        &self,
        conn: &mut PgConnection,
        invoice_id: i64,
        instance: &ServiceInstance,
    ) -> Result<i64> {
        let config = instance.config();
        let mut total = 0i64;

        for (quantity, unit_price, item_type) in [
            (config.purchased_api_keys, config.api_key_unit_price_usd_cents, ItemType::ExtraApiKeys),
            (config.purchased_seal_keys, config.seal_key_unit_price_usd_cents, ItemType::ExtraSealKeys),
            (config.purchased_packages, config.package_unit_price_usd_cents, ItemType::ExtraPackages),
        ] {
            if quantity <= 0 {
                continue;
            }
            let amount = unit_price * quantity as i64;
            self.invoices
                .repo()
                .insert_line_item(
                    conn,
                    crate::repository::traits::NewLineItem {
                        invoice_id,
                        item_type,
                        service_type: instance.service_type.clone(),
                        quantity,
                        unit_price_usd_cents: unit_price,
                        amount_usd_cents: amount,
                        description: Some(item_type.description(&instance.service_type)),
                    },
                )
                .await?;
            total += amount;
        }
        Ok(total)
    }
}

/// `floor((new − old) × days_remaining / days_in_month)`, where
/// `days_remaining = days_in_month − day + 1`. Returns 0 inside the 2-day
/// grace window at month end.
pub async fn calculate_pro_rated_upgrade_charge(
    old_price_usd_cents: i64,
    new_price_usd_cents: i64,
    clock: &dyn Clock,
) -> Result<i64> {
    let today = clock.today().await?;
    let in_month = days_in_month(today) as i64;
    let day_of_month = today.day() as i64;
    let days_remaining = in_month - day_of_month + 1;

    if days_remaining <= 2 {
        return Ok(0);
    }

    Ok(((new_price_usd_cents - old_price_usd_cents) * days_remaining) / in_month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{InMemoryClockStore, MockClock};
    use chrono::{DateTime, Utc};

    #[tokio::test]
    async fn pro_rated_charge_zero_near_month_end() {
        let store = InMemoryClockStore::new();
        let clock = MockClock::new(store, "k");
        let t = DateTime::parse_from_rfc3339("2026-01-30T00:00:00Z").unwrap().with_timezone(&Utc);
        clock.set(t).await.unwrap();
        let charge = calculate_pro_rated_upgrade_charge(1000, 2000, &clock).await.unwrap();
        assert_eq!(charge, 0);
    }

    #[tokio::test]
    async fn pro_rated_charge_mid_month() {
        let store = InMemoryClockStore::new();
        let clock = MockClock::new(store, "k");
        let t = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap().with_timezone(&Utc);
        clock.set(t).await.unwrap();
        // days_remaining = 31 - 15 + 1 = 17; (2000-1000)*17/31 = 548
        let charge = calculate_pro_rated_upgrade_charge(1000, 2000, &clock).await.unwrap();
        assert_eq!(charge, 548);
    }
}
