//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values can come from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    pub provider: ProviderConfig,
    pub payments: PaymentsConfig,
    pub alerting: AlertingConfig,
    pub jobs: JobsConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Per-minute call rate in US cents
    #[serde(default = "default_rate_cents")]
    pub rate_cents_per_minute: i64,

    /// USD to GBP conversion rate applied after the cent calculation
    #[serde(default = "default_usd_to_gbp")]
    pub usd_to_gbp_rate: f64,

    /// Minutes reserved for a call when the caller gives no estimate
    #[serde(default = "default_reservation_minutes")]
    pub default_reservation_minutes: i64,

    /// Reservation TTL in seconds before the sweeper may expire it
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: i64,

    /// Amount credited by one auto-recharge top-up, in pence
    #[serde(default = "default_topup_pence")]
    pub auto_recharge_topup_pence: i64,
}

fn default_rate_cents() -> i64 {
    70
}

fn default_usd_to_gbp() -> f64 {
    0.79
}

fn default_reservation_minutes() -> i64 {
    10
}

fn default_reservation_ttl() -> i64 {
    3600
}

fn default_topup_pence() -> i64 {
    2000
}

/// Upstream call provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub base_url: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,

    /// Page size for the call listing endpoint
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Delay between paginated requests in milliseconds
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
}

fn default_provider_timeout() -> u64 {
    10_000
}

fn default_page_size() -> u32 {
    100
}

fn default_page_delay() -> u64 {
    250
}

/// Payment gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Base URL of the payment gateway
    pub base_url: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_payments_timeout")]
    pub timeout_ms: u64,
}

fn default_payments_timeout() -> u64 {
    15_000
}

/// Operator alerting configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AlertingConfig {
    /// Webhook URL for alert delivery; alerts are log-only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_alert_timeout")]
    pub timeout_ms: u64,
}

fn default_alert_timeout() -> u64 {
    5_000
}

/// Background job scheduling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    /// Reservation expiry sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Reconciliation run interval in seconds
    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval_secs: u64,

    /// Trailing window reconciled on each run, in hours
    #[serde(default = "default_reconciliation_window")]
    pub reconciliation_window_hours: i64,

    /// Reliability below this fraction raises a critical alert
    #[serde(default = "default_reliability_threshold")]
    pub reliability_alert_threshold: f64,
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_reconciliation_interval() -> u64 {
    86_400
}

fn default_reconciliation_window() -> i64 {
    48
}

fn default_reliability_threshold() -> f64 {
    0.95
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("billing.rate_cents_per_minute", 70)?
            .set_default("billing.usd_to_gbp_rate", 0.79)?
            .set_default("billing.default_reservation_minutes", 10)?
            .set_default("billing.reservation_ttl_secs", 3600)?
            .set_default("billing.auto_recharge_topup_pence", 2000)?
            .set_default("provider.timeout_ms", 10_000)?
            .set_default("provider.page_size", 100)?
            .set_default("provider.page_delay_ms", 250)?
            .set_default("payments.timeout_ms", 15_000)?
            .set_default("alerting.timeout_ms", 5_000)?
            .set_default("jobs.sweep_interval_secs", 600)?
            .set_default("jobs.reconciliation_interval_secs", 86_400)?
            .set_default("jobs.reconciliation_window_hours", 48)?
            .set_default("jobs.reliability_alert_threshold", 0.95)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with VOCALIS_ prefix
            .add_source(
                Environment::with_prefix("VOCALIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("VOCALIS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            rate_cents_per_minute: 70,
            usd_to_gbp_rate: 0.79,
            default_reservation_minutes: 10,
            reservation_ttl_secs: 3600,
            auto_recharge_topup_pence: 2000,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 600,
            reconciliation_interval_secs: 86_400,
            reconciliation_window_hours: 48,
            reliability_alert_threshold: 0.95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.rate_cents_per_minute, 70);
        assert_eq!(config.reservation_ttl_secs, 3600);
    }

    #[test]
    fn test_default_jobs_config() {
        let config = JobsConfig::default();
        assert_eq!(config.sweep_interval_secs, 600);
        assert!((config.reliability_alert_threshold - 0.95).abs() < f64::EPSILON);
    }
}
