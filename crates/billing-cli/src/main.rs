use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use billing_core::clock::{Clock, MockClock, WallClock};
use billing_core::config::ClockSource;
use billing_core::repository::postgres::{
    PostgresCancellationHistoryRepository, PostgresClockStore, PostgresCreditRepository,
    PostgresCustomerRepository, PostgresIdempotencyRepository, PostgresInvoiceRepository,
    PostgresNotificationRepository, PostgresPaymentMethodRepository,
    PostgresServiceInstanceRepository, PostgresUsageSource,
};
use billing_core::services::{CustomerBillingProcessor, GraceService, ServiceBillingService, TierService};
use billing_core::{
    create_pool, migrate, CleanupService, Config, CreditService, CustomerLock, IdempotencyService,
    InvoiceService, InvoiceValidator, PaymentProcessor, PeriodicJob, ProviderRegistry,
    ReconciliationService, Result, UsageService,
};

#[derive(Parser)]
#[command(name = "billing-cli")]
#[command(about = "Subscription billing engine operator CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Set log level")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,

    /// Run the periodic billing tick
    Periodic {
        #[command(subcommand)]
        command: PeriodicCommands,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum PeriodicCommands {
    /// Process every customer once: billing, reconciliation, cleanup, housekeeping
    Run,

    /// Process a single customer's billing sequence (admin/debug tool)
    RunCustomer {
        #[arg(help = "Customer id")]
        customer_id: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = match &cli.config {
        Some(path) => Config::load(path.to_str().expect("config path must be valid UTF-8"))?,
        None => Config::from_env()?,
    };

    info!(version = billing_core::VERSION, "starting billing-cli");

    match cli.command {
        Commands::Migrate => {
            let pool = create_pool(&config.database).await?;
            migrate(&pool).await?;
            println!("migrations applied successfully");
        }

        Commands::Config => {
            println!("{:#?}", config);
        }

        Commands::Periodic { command } => {
            let pool = create_pool(&config.database).await?;
            let job = build_periodic_job(pool, &config).await?;

            match command {
                PeriodicCommands::Run => {
                    let report = job.run().await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                PeriodicCommands::RunCustomer { customer_id } => {
                    let report = job.run_for_customer(customer_id).await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
    }

    Ok(())
}

/// Wires the full service graph from configuration. Payment-provider clients
/// (escrow/card/wallet network integrations) are external collaborators per
/// spec.md §1 and have no implementation in this crate; the registry built
/// here starts empty and is populated by deployment-specific wiring.
async fn build_periodic_job(pool: sqlx::PgPool, config: &Config) -> Result<PeriodicJob> {
    let clock: Arc<dyn Clock> = match config.clock.source {
        ClockSource::Wall => Arc::new(WallClock),
        ClockSource::Mock => Arc::new(MockClock::new(
            PostgresClockStore::new(pool.clone()),
            config.clock.mock_storage_key.clone(),
        )),
    };

    let customers = Arc::new(PostgresCustomerRepository);
    let service_instances = Arc::new(PostgresServiceInstanceRepository);
    let invoices_repo = Arc::new(PostgresInvoiceRepository);
    let credits_repo = Arc::new(PostgresCreditRepository);
    let idempotency_repo = Arc::new(PostgresIdempotencyRepository);
    let cancellation_history = Arc::new(PostgresCancellationHistoryRepository);
    let notifications = Arc::new(PostgresNotificationRepository);
    let payment_methods = Arc::new(PostgresPaymentMethodRepository);
    let usage_source = Arc::new(PostgresUsageSource::new(pool.clone()));

    let lock_timeout = config.database.advisory_lock_timeout_secs;

    let invoices = InvoiceService::new(invoices_repo.clone(), clock.clone());
    let credits = CreditService::new(credits_repo.clone(), invoices_repo.clone(), clock.clone());
    let payments = PaymentProcessor::new(invoices_repo.clone(), credits.clone(), clock.clone());
    let validator = InvoiceValidator::new(invoices_repo.clone(), credits_repo.clone(), notifications.clone());
    let idempotency = IdempotencyService::new(idempotency_repo.clone());
    let usage = UsageService::new(usage_source, invoices_repo.clone(), clock.clone());
    let grace = GraceService::new(customers.clone(), service_instances.clone(), clock.clone(), config.dunning.clone());

    let service_billing = ServiceBillingService::new(
        invoices.clone(),
        credits.clone(),
        payments.clone(),
        customers.clone(),
        service_instances.clone(),
        validator.clone(),
        clock.clone(),
    );

    let tier = TierService::new(
        pool.clone(),
        CustomerLock::new(pool.clone(), lock_timeout),
        service_instances.clone(),
        cancellation_history.clone(),
        invoices.clone(),
        payments.clone(),
        service_billing.clone(),
        clock.clone(),
    );

    let billing = CustomerBillingProcessor::new(
        CustomerLock::new(pool.clone(), lock_timeout),
        idempotency,
        invoices.clone(),
        payments.clone(),
        service_billing,
        tier,
        grace,
        usage,
        validator,
        customers.clone(),
        service_instances.clone(),
        payment_methods,
        ProviderRegistry::new(),
        config.dunning.clone(),
        clock.clone(),
    );

    let reconciliation = ReconciliationService::new(invoices_repo, clock.clone());
    let cleanup = CleanupService::new(
        pool.clone(),
        CustomerLock::new(pool.clone(), lock_timeout),
        service_instances,
        cancellation_history.clone(),
        clock.clone(),
    );
    let idempotency_for_sweep = IdempotencyService::new(idempotency_repo);

    Ok(PeriodicJob::new(
        pool,
        billing,
        reconciliation,
        cleanup,
        idempotency_for_sweep,
        customers,
        cancellation_history,
        clock,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_periodic_run() {
        let cli = Cli::parse_from(["billing-cli", "periodic", "run"]);
        assert!(matches!(cli.command, Commands::Periodic { command: PeriodicCommands::Run }));
    }

    #[test]
    fn test_cli_parse_migrate() {
        let cli = Cli::parse_from(["billing-cli", "migrate"]);
        assert!(matches!(cli.command, Commands::Migrate));
    }

    #[test]
    fn test_cli_parse_periodic_run_customer() {
        let cli = Cli::parse_from(["billing-cli", "periodic", "run-customer", "42"]);
        match cli.command {
            Commands::Periodic { command: PeriodicCommands::RunCustomer { customer_id } } => {
                assert_eq!(customer_id, 42);
            }
            _ => panic!("expected RunCustomer"),
        }
    }
}
