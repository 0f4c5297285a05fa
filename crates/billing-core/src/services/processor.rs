use std::sync::Arc;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::DunningConfig;
use crate::idempotency::{monthly_key, IdempotencyService};
use crate::invoices::InvoiceService;
use crate::locking::CustomerLock;
use crate::models::InvoiceStatus;
use crate::payment::chain::{load_provider_chain, ProviderRegistry};
use crate::payment::processor::PaymentProcessor;
use crate::repository::traits::{CustomerRepository, InvoiceRepository, PaymentMethodRepository, ServiceInstanceRepository};
use crate::services::grace_service::GraceService;
use crate::services::service_billing::ServiceBillingService;
use crate::services::tier_service::TierService;
use crate::usage::UsageService;
use crate::validation::InvoiceValidator;
use crate::{Error, Result};

/// A retry is only attempted once this many hours have elapsed since the
/// invoice's last attempt.
const RETRY_AFTER_HOURS: i64 = 24;

/// Per-customer outcome of one [`CustomerBillingProcessor::process_customer`]
/// tick, returned for observability and tests rather than for control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerBillingReport {
    pub customer_id: i32,
    pub ran_monthly_block: bool,
    pub invoices_charged: u32,
    pub invoices_skipped_invalid: u32,
    pub retries_attempted: u32,
    pub retries_succeeded: u32,
    pub suspended_for_non_payment: bool,
    pub usage_synced: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MonthlyOutcome {
    invoices_charged: u32,
    invoices_skipped_invalid: u32,
}

/// Drives one customer through the full per-tick billing sequence (C14):
/// monthly block on the 1st, failed-payment retries, grace-expiry check, and
/// — on every other day — a debounced hourly usage sync. Everything here runs
/// under that customer's advisory lock; nothing here iterates other
/// customers (that's [`crate::periodic::run_periodic_job`], C15).
pub struct CustomerBillingProcessor {
    lock: CustomerLock,
    idempotency: IdempotencyService,
    invoices: InvoiceService,
    payments: PaymentProcessor,
    service_billing: ServiceBillingService,
    tier: TierService,
    grace: GraceService,
    usage: UsageService,
    validator: InvoiceValidator,
    customers: Arc<dyn CustomerRepository>,
    service_instances: Arc<dyn ServiceInstanceRepository>,
    payment_methods: Arc<dyn PaymentMethodRepository>,
    provider_registry: ProviderRegistry,
    dunning: DunningConfig,
    clock: Arc<dyn Clock>,
}

impl CustomerBillingProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: CustomerLock,
        idempotency: IdempotencyService,
        invoices: InvoiceService,
        payments: PaymentProcessor,
        service_billing: ServiceBillingService,
        tier: TierService,
        grace: GraceService,
        usage: UsageService,
        validator: InvoiceValidator,
        customers: Arc<dyn CustomerRepository>,
        service_instances: Arc<dyn ServiceInstanceRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
        provider_registry: ProviderRegistry,
        dunning: DunningConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lock,
            idempotency,
            invoices,
            payments,
            service_billing,
            tier,
            grace,
            usage,
            validator,
            customers,
            service_instances,
            payment_methods,
            provider_registry,
            dunning,
            clock,
        }
    }

    pub async fn process_customer(&self, customer_id: i32) -> Result<CustomerBillingReport> {
        let mut report = CustomerBillingReport { customer_id, ..Default::default() };
        let today = self.clock.today().await?;

        if today.day() == 1 {
            let monthly = self.run_monthly_block(customer_id, today).await?;
            report.ran_monthly_block = true;
            report.invoices_charged += monthly.invoices_charged;
            report.invoices_skipped_invalid += monthly.invoices_skipped_invalid;
        }

        let (attempted, succeeded) = self.retry_failed_payments(customer_id).await?;
        report.retries_attempted = attempted;
        report.retries_succeeded = succeeded;

        report.suspended_for_non_payment = self.check_grace_expiry(customer_id).await?;

        if today.day() != 1 {
            report.usage_synced = self.sync_hourly_usage(customer_id).await?;
        }

        Ok(report)
    }

    /// Spec's step 1: tier/cancellation transitions, usage fold, validation,
    /// then DRAFT → PENDING and a C7 settle attempt. Wrapped end to end in
    /// the monthly idempotency key so a crashed or re-delivered tick never
    /// double-charges.
    async fn run_monthly_block(&self, customer_id: i32, today: chrono::NaiveDate) -> Result<MonthlyOutcome> {
        let key = monthly_key(customer_id, today.year(), today.month());
        self.lock
            .with_customer_lock(customer_id, |mut tx| {
                let key = key.clone();
                async move {
                    let outcome = self
                        .idempotency
                        .with_idempotency(&mut tx, &key, |conn| self.run_monthly_block_inner(conn, customer_id))
                        .await?;
                    Ok((tx, outcome.value))
                }
            })
            .await
    }

    async fn run_monthly_block_inner(&self, conn: &mut PgConnection, customer_id: i32) -> Result<MonthlyOutcome> {
        let mut outcome = MonthlyOutcome::default();

        let tier_changes = self.tier.apply_scheduled_tier_changes(conn, customer_id).await?;
        if tier_changes > 0 {
            self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;
        }

        let cancellations = self.tier.process_scheduled_cancellations(conn, customer_id).await?;
        if cancellations > 0 {
            self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;
        }

        let draft = self.invoices.get_or_create_draft(conn, customer_id).await?;
        self.usage.sync_usage_to_draft(conn, &draft).await?;

        if let Err(e) = self.validator.ensure_invoice_valid(conn, draft.id).await {
            if e.is_validation() {
                warn!(customer_id, invoice_id = draft.id, "draft invoice failed validation, skipping this cycle");
                outcome.invoices_skipped_invalid += 1;
                return Ok(outcome);
            }
            return Err(e);
        }

        self.invoices.transition_draft_to_pending(conn, draft.id).await?;

        let providers = load_provider_chain(conn, self.payment_methods.as_ref(), &self.provider_registry, customer_id).await?;
        let pay_outcome = self.payments.process_invoice_payment(conn, draft.id, &providers).await?;

        if pay_outcome.fully_paid {
            outcome.invoices_charged += 1;
            self.grace.clear_grace_period(conn, customer_id).await?;
            self.mark_paid_once(conn, customer_id).await?;
            info!(customer_id, invoice_id = draft.id, "monthly invoice settled");
        } else {
            warn!(customer_id, invoice_id = draft.id, error = ?pay_outcome.error, "monthly invoice not fully paid");
        }

        Ok(outcome)
    }

    /// Spec's step 2: every invoice past its retry cooldown, still under
    /// `max_retries`, gets reset to `pending` and resettled.
    async fn retry_failed_payments(&self, customer_id: i32) -> Result<(u32, u32)> {
        let max_retries = self.dunning.max_retries as i32;
        self.lock
            .with_customer_lock(customer_id, |mut tx| async move {
                let now = self.clock.now().await?;
                let retry_after = now - chrono::Duration::hours(RETRY_AFTER_HOURS);
                let failed = self.invoices.repo().find_failed_retriable(&mut tx, customer_id, max_retries, retry_after).await?;

                if failed.is_empty() {
                    return Ok((tx, (0, 0)));
                }

                let providers =
                    load_provider_chain(&mut tx, self.payment_methods.as_ref(), &self.provider_registry, customer_id).await?;

                let mut attempted = 0u32;
                let mut succeeded = 0u32;
                for invoice in failed {
                    attempted += 1;
                    self.invoices.repo().update_status(&mut tx, invoice.id, InvoiceStatus::Pending).await?;
                    let outcome = self.payments.process_invoice_payment(&mut tx, invoice.id, &providers).await?;
                    if outcome.fully_paid {
                        succeeded += 1;
                        self.grace.clear_grace_period(&mut tx, customer_id).await?;
                        self.mark_paid_once(&mut tx, customer_id).await?;
                        info!(customer_id, invoice_id = invoice.id, "retried invoice settled");
                    } else {
                        warn!(customer_id, invoice_id = invoice.id, error = ?outcome.error, "invoice retry failed again");
                    }
                }
                Ok((tx, (attempted, succeeded)))
            })
            .await
    }

    /// Spec's step 3: suspend services the moment the grace window elapses.
    async fn check_grace_expiry(&self, customer_id: i32) -> Result<bool> {
        self.lock
            .with_customer_lock(customer_id, |mut tx| async move {
                if !self.grace.is_grace_period_expired(&mut tx, customer_id).await? {
                    return Ok((tx, false));
                }
                self.grace.suspend_customer_for_non_payment(&mut tx, customer_id).await?;
                warn!(customer_id, "grace period expired, suspended for non-payment");
                Ok((tx, true))
            })
            .await
    }

    /// Spec's step 4: on any day other than the 1st, a debounced usage fold
    /// keeps the DRAFT visible without re-running the whole monthly block.
    async fn sync_hourly_usage(&self, customer_id: i32) -> Result<bool> {
        self.lock
            .with_customer_lock(customer_id, |mut tx| async move {
                let draft = self.invoices.get_or_create_draft(&mut tx, customer_id).await?;
                let synced = self.usage.hourly_sync_if_due(&mut tx, &draft).await?;
                Ok((tx, synced))
            })
            .await
    }

    async fn mark_paid_once(&self, conn: &mut PgConnection, customer_id: i32) -> Result<()> {
        let mut customer = self
            .customers
            .find_by_id(conn, customer_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("customer {customer_id}")))?;
        customer.paid_once = true;
        self.customers.update(conn, &customer).await?;

        let instances = self.service_instances.list_by_customer(conn, customer_id).await?;
        for mut instance in instances {
            if !instance.paid_once {
                instance.paid_once = true;
                self.service_instances.update(conn, &instance).await?;
            }
        }
        Ok(())
    }
}
