//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::jobs::JobSchedulerConfig;
use crate::outbox::RetryPolicy;
use crate::settlement::SettlementConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Emit JSON log lines instead of the pretty format
    pub log_json: bool,

    /// Release window for suppliers without a plan
    pub default_release_days: i64,

    pub release_sweep_interval: Duration,
    pub overdue_sweep_interval: Duration,
    pub outbox_dispatch_interval: Duration,

    pub outbox_max_attempts: i32,
    pub outbox_base_delay: Duration,
    pub outbox_max_delay: Duration,
    pub outbox_batch_size: i64,

    /// Third-party endpoints that receive outbound events
    pub forward_urls: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let log_json = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => true,
            Ok("pretty") | Err(_) => false,
            Ok(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_json,
            default_release_days: parse_or("DEFAULT_RELEASE_DAYS", 14)?,
            release_sweep_interval: secs_or("RELEASE_SWEEP_INTERVAL_SECS", 300)?,
            overdue_sweep_interval: secs_or("OVERDUE_SWEEP_INTERVAL_SECS", 3600)?,
            outbox_dispatch_interval: secs_or("OUTBOX_DISPATCH_INTERVAL_SECS", 30)?,
            outbox_max_attempts: parse_or("OUTBOX_MAX_ATTEMPTS", 6)?,
            outbox_base_delay: secs_or("OUTBOX_BASE_DELAY_SECS", 30)?,
            outbox_max_delay: secs_or("OUTBOX_MAX_DELAY_SECS", 3600)?,
            outbox_batch_size: parse_or("OUTBOX_BATCH_SIZE", 50)?,
            forward_urls: split_urls(&env::var("WEBHOOK_FORWARD_URLS").unwrap_or_default()),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            default_release_days: self.default_release_days,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.outbox_max_attempts,
            base_delay: self.outbox_base_delay,
            max_delay: self.outbox_max_delay,
        }
    }

    pub fn scheduler(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            release_sweep_interval: self.release_sweep_interval,
            overdue_sweep_interval: self.overdue_sweep_interval,
            outbox_dispatch_interval: self.outbox_dispatch_interval,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

fn secs_or(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(name, default)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue(name));
    }
    Ok(Duration::from_secs(secs))
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
