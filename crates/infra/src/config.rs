//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono_tz::Tz;

use stockledger_observability::{LogConfig, LogFormat};

use crate::engine::RetryPolicy;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String, max_connections: u32 },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageConfig,
    pub retry: RetryPolicy,
    pub export_default_tz: Tz,
    pub export_batch_size: u32,
    pub low_stock_threshold: i64,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            storage: StorageConfig::InMemory,
            retry: RetryPolicy::default(),
            export_default_tz: Tz::UTC,
            export_batch_size: 500,
            low_stock_threshold: 5,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// True when tokens are verified with the built-in dev secret. Checked by
    /// the binary once logging is up.
    pub fn uses_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = get("JWT_SECRET").unwrap_or(defaults.jwt_secret);

        let persistent = parse_or("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), false)?;
        let storage = if persistent {
            let database_url = get("DATABASE_URL")
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            StorageConfig::Postgres {
                database_url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), 10)?,
            }
        } else {
            StorageConfig::InMemory
        };

        let max_attempts: u32 = parse_or("RECONCILE_MAX_ATTEMPTS", get("RECONCILE_MAX_ATTEMPTS"), 5)?;
        if max_attempts == 0 {
            bail!("RECONCILE_MAX_ATTEMPTS must be at least 1");
        }
        let backoff_ms: u64 = parse_or("RECONCILE_BACKOFF_MS", get("RECONCILE_BACKOFF_MS"), 10)?;

        let export_default_tz = match get("EXPORT_DEFAULT_TZ") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("EXPORT_DEFAULT_TZ: {e}"))?,
            None => defaults.export_default_tz,
        };
        let export_batch_size: u32 = parse_or("EXPORT_BATCH_SIZE", get("EXPORT_BATCH_SIZE"), 500)?;
        if export_batch_size == 0 {
            bail!("EXPORT_BATCH_SIZE must be at least 1");
        }

        let low_stock_threshold: i64 = parse_or("LOW_STOCK_THRESHOLD", get("LOW_STOCK_THRESHOLD"), 5)?;
        if low_stock_threshold < 0 {
            bail!("LOW_STOCK_THRESHOLD must be non-negative");
        }

        let log = LogConfig {
            format: parse_or("LOG_FORMAT", get("LOG_FORMAT"), LogFormat::default())?,
            ..LogConfig::default()
        };

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", get("BIND_ADDR"), defaults.bind_addr)?,
            jwt_secret,
            storage,
            retry: RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(backoff_ms),
            },
            export_default_tz,
            export_batch_size,
            low_stock_threshold,
            log,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}: invalid value '{v}': {e}")),
        None => Ok(default),
    }
}
