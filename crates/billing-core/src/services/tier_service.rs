use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::clock::{first_of_next_month, last_of_month, Clock};
use crate::invoices::{CreateImmediateInvoiceParams, InvoiceService, LineItemParams};
use crate::locking::CustomerLock;
use crate::models::{ItemType, ServiceInstance, ServiceState, Tier};
use crate::payment::processor::PaymentProcessor;
use crate::payment::PaymentProvider;
use crate::repository::traits::{CancellationHistoryRepository, ServiceInstanceRepository};
use crate::services::service_billing::{calculate_pro_rated_upgrade_charge, ServiceBillingService};
use crate::{Error, Result};

/// Phase 1 output of the two-phase upgrade: revalidated blockers and the
/// recomputed charge, decided under the first lock acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase1Result {
    pub can_proceed: bool,
    pub current_tier: Tier,
    pub new_tier: Tier,
    pub charge_cents: i64,
    pub description: String,
    pub service_type: String,
    pub use_simple_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeOutcome {
    pub service_instance_id: i64,
    pub tier: Tier,
    pub charge_cents: i64,
    pub invoice_id: Option<i64>,
    pub fully_paid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub deleted: bool,
    pub cancellation_scheduled_for: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionAvailability {
    pub allowed: bool,
    pub reason: Option<String>,
    pub available_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// State machine for upgrade/downgrade/cancel/undo (C10).
pub struct TierService {
    pool: PgPool,
    lock: CustomerLock,
    service_instances: Arc<dyn ServiceInstanceRepository>,
    cancellation_history: Arc<dyn CancellationHistoryRepository>,
    invoices: InvoiceService,
    payments: PaymentProcessor,
    service_billing: ServiceBillingService,
    clock: Arc<dyn Clock>,
}

impl TierService {
    pub fn new(
        pool: PgPool,
        lock: CustomerLock,
        service_instances: Arc<dyn ServiceInstanceRepository>,
        cancellation_history: Arc<dyn CancellationHistoryRepository>,
        invoices: InvoiceService,
        payments: PaymentProcessor,
        service_billing: ServiceBillingService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pool, lock, service_instances, cancellation_history, invoices, payments, service_billing, clock }
    }

    fn reject_if_wrong_direction(instance: &ServiceInstance, new_tier: Tier, upgrading: bool) -> Result<()> {
        if instance.has_scheduled_cancellation() {
            return Err(Error::TierChangeWhileCancellationScheduled { service_instance_id: instance.id });
        }
        let effective = instance.effective_tier();
        if upgrading && new_tier <= effective {
            return Err(Error::validation("WRONG_DIRECTION", "upgrade target must be a higher tier"));
        }
        if !upgrading && new_tier >= effective {
            return Err(Error::validation("WRONG_DIRECTION", "downgrade target must be a lower tier"));
        }
        Ok(())
    }

    async fn load_instance(&self, conn: &mut PgConnection, customer_id: i32, service_type: &str) -> Result<ServiceInstance> {
        self.service_instances
            .find(conn, customer_id, service_type)
            .await?
            .ok_or_else(|| Error::not_found(format!("service instance {customer_id}/{service_type}")))
    }

    /// Two-phase upgrade. `paid_once=false` or `charge==0` routes through the
    /// simple single-transaction path instead of the committed middle step.
    pub async fn upgrade(
        &self,
        customer_id: i32,
        service_type: &str,
        new_tier: Tier,
        new_price_usd_cents: i64,
        providers: &[Arc<dyn PaymentProvider>],
    ) -> Result<UpgradeOutcome> {
        let clock = self.clock.clone();
        let phase1 = self
            .lock
            .with_customer_lock(customer_id, |mut tx| {
                let service_type = service_type.to_string();
                let clock = clock.clone();
                async move {
                    let instance = self.load_instance(&mut tx, customer_id, &service_type).await?;
                    Self::reject_if_wrong_direction(&instance, new_tier, true)?;

                    let charge = calculate_pro_rated_upgrade_charge(
                        instance.current_tier_price_usd_cents,
                        new_price_usd_cents,
                        clock.as_ref(),
                    )
                    .await?;
                    let use_simple_path = charge == 0 || !instance.paid_once;

                    let result = Phase1Result {
                        can_proceed: true,
                        current_tier: instance.tier,
                        new_tier,
                        charge_cents: charge,
                        description: new_tier.item_type().description(&service_type),
                        service_type,
                        use_simple_path,
                    };
                    Ok((tx, result))
                }
            })
            .await?;

        if phase1.use_simple_path {
            return self
                .lock
                .with_customer_lock(customer_id, |mut tx| {
                    let service_type = phase1.service_type.clone();
                    async move {
                        let outcome =
                            self.apply_simple_tier_change(&mut tx, customer_id, &service_type, new_tier, new_price_usd_cents).await?;
                        Ok((tx, outcome))
                    }
                })
                .await;
        }

        let invoice = self
            .invoices
            .create_pending_invoice_committed(
                &self.pool,
                CreateImmediateInvoiceParams {
                    customer_id,
                    amount_usd_cents: phase1.charge_cents,
                    line_items: vec![LineItemParams {
                        item_type: ItemType::TierUpgrade,
                        service_type: phase1.service_type.clone(),
                        quantity: 1,
                        unit_price_usd_cents: phase1.charge_cents,
                        amount_usd_cents: phase1.charge_cents,
                    }],
                },
            )
            .await?;

        self.lock
            .with_customer_lock(customer_id, |mut tx| {
                let service_type = phase1.service_type.clone();
                let invoice_id = invoice.id;
                async move {
                    let instance = self.load_instance(&mut tx, customer_id, &service_type).await?;
                    if instance.tier != phase1.current_tier || instance.has_scheduled_cancellation() {
                        self.invoices.delete_unpaid_invoice(&mut tx, invoice_id).await?;
                        return Err(Error::validation("TIER_CHANGED", "tier changed, please retry"));
                    }

                    let pay_outcome = self.payments.process_invoice_payment(&mut tx, invoice_id, providers).await?;
                    if !pay_outcome.fully_paid {
                        self.invoices.delete_unpaid_invoice(&mut tx, invoice_id).await?;
                        let outcome = UpgradeOutcome {
                            service_instance_id: instance.id,
                            tier: instance.tier,
                            charge_cents: phase1.charge_cents,
                            invoice_id: None,
                            fully_paid: false,
                            error: pay_outcome.error,
                        };
                        return Ok((tx, outcome));
                    }

                    let mut updated = instance.clone();
                    updated.tier = new_tier;
                    updated.scheduled_tier = None;
                    updated.scheduled_tier_effective_date = None;
                    updated.scheduled_tier_price_usd_cents = None;
                    updated.cancellation_scheduled_for = None;
                    self.service_instances.update(&mut tx, &updated).await?;
                    self.service_billing.recalculate_draft_invoice(&mut tx, customer_id).await?;

                    let outcome = UpgradeOutcome {
                        service_instance_id: updated.id,
                        tier: new_tier,
                        charge_cents: phase1.charge_cents,
                        invoice_id: Some(invoice_id),
                        fully_paid: true,
                        error: None,
                    };
                    Ok((tx, outcome))
                }
            })
            .await
    }

    /// Single-transaction upgrade applied when `charge==0` or
    /// `paid_once==false`; also used directly by `downgrade` when
    /// `paid_once==false`.
    async fn apply_simple_tier_change(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
        new_tier: Tier,
        new_price_usd_cents: i64,
    ) -> Result<UpgradeOutcome> {
        let mut instance = self.load_instance(conn, customer_id, service_type).await?;
        instance.tier = new_tier;
        instance.current_tier_price_usd_cents = new_price_usd_cents;
        instance.scheduled_tier = None;
        instance.scheduled_tier_effective_date = None;
        instance.scheduled_tier_price_usd_cents = None;
        instance.cancellation_scheduled_for = None;

        if !instance.paid_once {
            if let Some(pending_id) = instance.sub_pending_invoice_id {
                self.invoices
                    .rewrite_subscription_line_item(
                        conn,
                        pending_id,
                        service_type,
                        new_tier.item_type(),
                        new_price_usd_cents,
                    )
                    .await?;
            }
        }

        self.service_instances.update(conn, &instance).await?;
        self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;

        Ok(UpgradeOutcome {
            service_instance_id: instance.id,
            tier: new_tier,
            charge_cents: 0,
            invoice_id: instance.sub_pending_invoice_id,
            fully_paid: true,
            error: None,
        })
    }

    /// Applies immediately (like an upgrade simple path) when
    /// `paid_once=false`; otherwise schedules the change for the 1st of next
    /// month. Must run under the customer lock.
    pub async fn downgrade(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
        new_tier: Tier,
        new_price_usd_cents: i64,
    ) -> Result<UpgradeOutcome> {
        let instance = self.load_instance(conn, customer_id, service_type).await?;
        Self::reject_if_wrong_direction(&instance, new_tier, false)?;

        if !instance.paid_once {
            return self.apply_simple_tier_change(conn, customer_id, service_type, new_tier, new_price_usd_cents).await;
        }

        let today = self.clock.today().await?;
        let mut updated = instance.clone();
        updated.scheduled_tier = Some(new_tier);
        updated.scheduled_tier_effective_date = Some(first_of_next_month(today));
        updated.scheduled_tier_price_usd_cents = Some(new_price_usd_cents);
        updated.cancellation_scheduled_for = None;
        self.service_instances.update(conn, &updated).await?;
        self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;

        Ok(UpgradeOutcome {
            service_instance_id: updated.id,
            tier: instance.tier,
            charge_cents: 0,
            invoice_id: None,
            fully_paid: true,
            error: None,
        })
    }

    /// Physically deletes the instance (and its unpaid pending invoice) when
    /// `paid_once=false`; otherwise schedules cancellation for the last day
    /// of the current month. Must run under the customer lock.
    pub async fn cancel(&self, conn: &mut PgConnection, customer_id: i32, service_type: &str) -> Result<CancelOutcome> {
        let instance = self.load_instance(conn, customer_id, service_type).await?;

        if !instance.paid_once {
            if let Some(pending_id) = instance.sub_pending_invoice_id {
                self.service_instances.delete(conn, instance.id).await?;
                self.invoices.delete_unpaid_invoice(conn, pending_id).await?;
            } else {
                self.service_instances.delete(conn, instance.id).await?;
            }
            return Ok(CancelOutcome { deleted: true, cancellation_scheduled_for: None });
        }

        let today = self.clock.today().await?;
        let effective = last_of_month(today);
        let mut updated = instance.clone();
        updated.cancellation_scheduled_for = Some(effective);
        updated.scheduled_tier = None;
        updated.scheduled_tier_effective_date = None;
        updated.scheduled_tier_price_usd_cents = None;
        self.service_instances.update(conn, &updated).await?;
        self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;

        Ok(CancelOutcome { deleted: false, cancellation_scheduled_for: Some(effective) })
    }

    /// Clears a scheduled cancellation, refusing once the grace period has
    /// actually started (`state=cancellation_pending`). Must run under the
    /// customer lock.
    pub async fn undo_cancel(&self, conn: &mut PgConnection, customer_id: i32, service_type: &str) -> Result<()> {
        let instance = self.load_instance(conn, customer_id, service_type).await?;

        if instance.state == ServiceState::CancellationPending {
            return Err(Error::GracePeriodExpiredCannotUndo { service_instance_id: instance.id });
        }

        if instance.cancellation_scheduled_for.is_none() {
            return Err(Error::validation("NO_CANCELLATION_SCHEDULED", "no cancellation scheduled"));
        }

        let mut updated = instance.clone();
        updated.cancellation_scheduled_for = None;
        self.service_instances.update(conn, &updated).await?;
        self.service_billing.recalculate_draft_invoice(conn, customer_id).await?;
        Ok(())
    }

    /// Read-only eligibility check for a new subscription, accounting for an
    /// active instance and any anti-abuse cooldown. Must run under the
    /// customer lock to read a consistent snapshot.
    pub async fn can_provision(
        &self,
        conn: &mut PgConnection,
        customer_id: i32,
        service_type: &str,
    ) -> Result<ProvisionAvailability> {
        if let Some(instance) = self.service_instances.find(conn, customer_id, service_type).await? {
            if instance.state == ServiceState::CancellationPending {
                return Ok(ProvisionAvailability {
                    allowed: false,
                    reason: Some("cancellation_pending".to_string()),
                    available_at: instance.cancellation_effective_at,
                });
            }
            if instance.state != ServiceState::NotProvisioned {
                return Ok(ProvisionAvailability {
                    allowed: false,
                    reason: Some("already_subscribed".to_string()),
                    available_at: None,
                });
            }
        }

        let now = self.clock.now().await?;
        if let Some(history) = self.cancellation_history.find_active_cooldown(conn, customer_id, service_type, now).await? {
            if history.is_cooldown_active(now) {
                return Ok(ProvisionAvailability {
                    allowed: false,
                    reason: Some("cooldown_active".to_string()),
                    available_at: Some(history.cooldown_expires_at),
                });
            }
        }

        Ok(ProvisionAvailability { allowed: true, reason: None, available_at: None })
    }

    /// Read-only eligibility check for key-management operations.
    pub async fn can_perform_key_operation(&self, conn: &mut PgConnection, customer_id: i32, service_type: &str) -> Result<bool> {
        let instance = match self.service_instances.find(conn, customer_id, service_type).await? {
            Some(i) => i,
            None => return Ok(false),
        };
        if !matches!(instance.state, ServiceState::Enabled | ServiceState::Disabled) {
            return Ok(false);
        }
        Ok(instance.paid_once)
    }

    /// For every instance with a due scheduled tier change: applies it and
    /// clears the scheduled fields. Returns the count applied. Must run
    /// under the customer lock.
    pub async fn apply_scheduled_tier_changes(&self, conn: &mut PgConnection, customer_id: i32) -> Result<u32> {
        let today = self.clock.today().await?;
        let due = self.service_instances.find_scheduled_tier_due(conn, customer_id, today).await?;
        let count = due.len() as u32;
        for mut instance in due {
            if let Some(tier) = instance.scheduled_tier {
                instance.tier = tier;
            }
            if let Some(price) = instance.scheduled_tier_price_usd_cents {
                instance.current_tier_price_usd_cents = price;
            }
            instance.scheduled_tier = None;
            instance.scheduled_tier_effective_date = None;
            instance.scheduled_tier_price_usd_cents = None;
            self.service_instances.update(conn, &instance).await?;
        }
        Ok(count)
    }

    /// For every instance with a due scheduled cancellation: moves it into
    /// `cancellation_pending` and starts the 7-day clock. Returns the count
    /// processed. Must run under the customer lock.
    pub async fn process_scheduled_cancellations(&self, conn: &mut PgConnection, customer_id: i32) -> Result<u32> {
        let today = self.clock.today().await?;
        let due = self.service_instances.find_scheduled_cancellation_due(conn, customer_id, today).await?;
        let count = due.len() as u32;
        let now = self.clock.now().await?;
        for mut instance in due {
            instance.state = ServiceState::CancellationPending;
            instance.is_user_enabled = false;
            instance.cancellation_effective_at = Some(now + chrono::Duration::days(7));
            instance.cancellation_scheduled_for = None;
            self.service_instances.update(conn, &instance).await?;
        }
        Ok(count)
    }
}
