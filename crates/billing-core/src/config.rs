use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root configuration for the billing engine, loaded from TOML with
/// environment-variable override, mirroring the layered `Config::load` /
/// `Config::from_env` pattern used across the rest of this workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub dunning: DunningConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub periodic_job: PeriodicJobConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            clock: ClockConfig::default(),
            dunning: DunningConfig::default(),
            provider: ProviderConfig::default(),
            periodic_job: PeriodicJobConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `BILLING_CONFIG_PATH` if set, else `./billing.toml`, else
    /// `/etc/billing/billing.toml`, falling back to defaults if none exist.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var("BILLING_CONFIG_PATH") {
            return Self::load(&path);
        }

        for candidate in ["./billing.toml", "/etc/billing/billing.toml"] {
            if std::path::Path::new(candidate).exists() {
                return Self::load(candidate);
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(Error::config("database.max_connections must be greater than zero"));
        }
        if self.database.advisory_lock_timeout_secs == 0 {
            return Err(Error::config("database.advisory_lock_timeout_secs must be greater than zero"));
        }
        if self.dunning.retry_intervals_days.is_empty() {
            return Err(Error::config("dunning.retry_intervals_days must not be empty"));
        }
        if self.dunning.grace_period_days == 0 {
            return Err(Error::config("dunning.grace_period_days must be greater than zero"));
        }
        if self.periodic_job.tick_interval_secs == 0 {
            return Err(Error::config("periodic_job.tick_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

/// Postgres pool sizing plus the advisory-lock wait budget (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Budget for `pg_advisory_xact_lock` acquisition per spec.md §5;
    /// exceeding it surfaces as `Error::LockTimeout`.
    #[serde(default = "default_advisory_lock_timeout_secs")]
    pub advisory_lock_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            advisory_lock_timeout_secs: default_advisory_lock_timeout_secs(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/billing".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_advisory_lock_timeout_secs() -> u64 {
    10
}

/// Which `Clock` implementation (C1) the process wires up, and where the
/// shared mock clock keeps its state when tests run the API and the
/// periodic worker against the same simulated time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_clock_source")]
    pub source: ClockSource,
    #[serde(default = "default_mock_clock_key")]
    pub mock_storage_key: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { source: default_clock_source(), mock_storage_key: default_mock_clock_key() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    Wall,
    Mock,
}

fn default_clock_source() -> ClockSource {
    ClockSource::Wall
}
fn default_mock_clock_key() -> String {
    "billing:clock:mock".to_string()
}

/// Retry cadence and grace-period policy (C11), generalizing the teacher's
/// own `DunningConfig` with spec.md's grace-period semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DunningConfig {
    #[serde(default = "default_retry_intervals_days")]
    pub retry_intervals_days: Vec<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,
}

impl Default for DunningConfig {
    fn default() -> Self {
        Self {
            retry_intervals_days: default_retry_intervals_days(),
            max_retries: default_max_retries(),
            grace_period_days: default_grace_period_days(),
        }
    }
}

fn default_retry_intervals_days() -> Vec<u32> {
    vec![1, 3, 7]
}
fn default_max_retries() -> u32 {
    3
}
fn default_grace_period_days() -> u32 {
    14
}

/// Per-provider enable/priority toggles for the payment-provider chain (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub escrow_enabled: bool,
    #[serde(default = "default_true")]
    pub card_enabled: bool,
    #[serde(default = "default_true")]
    pub wallet_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { escrow_enabled: true, card_enabled: true, wallet_enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Drives the periodic job's tick cadence (C15).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicJobConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_true")]
    pub reconcile_each_tick: bool,
}

impl Default for PeriodicJobConfig {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_interval_secs(), reconcile_each_tick: true }
    }
}

fn default_tick_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let mut config = Config::default();
        config.periodic_job.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_retry_intervals_rejected() {
        let mut config = Config::default();
        config.dunning.retry_intervals_days = vec![];
        assert!(config.validate().is_err());
    }
}
