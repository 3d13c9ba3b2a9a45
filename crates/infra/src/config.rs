//! Process configuration.
//!
//! Loaded from environment variables; every variable has a default so the
//! service starts with an in-memory store and no environment at all.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Default tracing filter; `RUST_LOG` overrides it.
    pub log_level: String,
    /// Period of the background expiry sweep.
    pub sweep_period: Duration,
    /// Retry policy for serialization conflicts.
    pub retry: RetryPolicy,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", || {
            SocketAddr::from(([0, 0, 0, 0], 8080))
        })?;

        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: positive(&lookup, "DB_MAX_CONNECTIONS", 10)?,
                connect_timeout: Duration::from_secs(positive(
                    &lookup,
                    "DB_CONNECT_TIMEOUT_SECS",
                    5,
                )?),
            }),
            None => None,
        };

        let log_level = lookup("LOG_LEVEL")
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let sweep_period = Duration::from_millis(positive(&lookup, "SWEEP_PERIOD_MS", 1000)?);

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: positive(&lookup, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff: Duration::from_millis(parse_or(&lookup, "RETRY_BASE_BACKOFF_MS", || {
                defaults.base_backoff.as_millis() as u64
            })?),
            ..defaults
        };

        let shutdown_timeout =
            Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", || 10)?);

        Ok(Self {
            bind_address,
            database,
            log_level,
            sweep_period,
            retry,
            shutdown_timeout,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: impl FnOnce() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default()),
    }
}

/// Like [`parse_or`] but zero is rejected.
fn positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq,
{
    let value = parse_or(lookup, var, || default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
        });
    }
    Ok(value)
}
