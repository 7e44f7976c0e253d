//! Configuration loading and representation.
//!
//! Everything is read from the process environment. Database settings can be
//! given as parts (`DB_HOST`, `DB_PORT`, ...) or as one `DATABASE_URL`, which
//! wins when both are present.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use thiserror::Error;

use crate::engine::{BalanceAfterPolicy, DEFAULT_OPERATION_TIMEOUT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which ledger store backs the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Non-durable; for local runs and tests.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    /// Overrides the parts above when set.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database: DatabaseConfig,
    pub store: StoreBackend,
    pub operation_timeout: Duration,
    pub balance_after_policy: BalanceAfterPolicy,
    pub api_port: u16,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let database = DatabaseConfig {
            host: text("DB_HOST", "localhost"),
            port: parse_or("DB_PORT", get("DB_PORT"), 5432)?,
            user: text("DB_USER", "ledger"),
            password: text("DB_PASSWORD", ""),
            name: text("DB_NAME", "ledger"),
            ssl_mode: text("DB_SSLMODE", "disable"),
            url: get("DATABASE_URL"),
            max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 10)?,
            acquire_timeout: millis_or("DB_ACQUIRE_TIMEOUT_MS", get("DB_ACQUIRE_TIMEOUT_MS"), 5_000)?,
            statement_timeout: millis_or(
                "DB_STATEMENT_TIMEOUT_MS",
                get("DB_STATEMENT_TIMEOUT_MS"),
                5_000,
            )?,
        };

        if database.max_connections == 0 {
            return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", "0", "must be at least 1"));
        }
        PgSslMode::from_str(&database.ssl_mode)
            .map_err(|e| ConfigError::invalid("DB_SSLMODE", &database.ssl_mode, e.to_string()))?;

        let store = match get("LEDGER_STORE") {
            None => StoreBackend::Postgres,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "postgres" => StoreBackend::Postgres,
                "memory" => StoreBackend::Memory,
                _ => {
                    return Err(ConfigError::invalid(
                        "LEDGER_STORE",
                        &raw,
                        "expected postgres or memory",
                    ));
                }
            },
        };

        let balance_after_policy = match get("LEDGER_BALANCE_AFTER_POLICY") {
            None => BalanceAfterPolicy::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid("LEDGER_BALANCE_AFTER_POLICY", &raw, format!("{e}")))?,
        };

        Ok(LedgerConfig {
            database,
            store,
            operation_timeout: millis_or(
                "LEDGER_OPERATION_TIMEOUT_MS",
                get("LEDGER_OPERATION_TIMEOUT_MS"),
                DEFAULT_OPERATION_TIMEOUT.as_millis() as u64,
            )?,
            balance_after_policy,
            api_port: parse_or("PUBLIC_API_PORT", get("PUBLIC_API_PORT"), 8002)?,
        })
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConfigError::invalid("DATABASE_URL", "<redacted>", e.to_string()))?,
            None => PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.name)
                .ssl_mode(
                    PgSslMode::from_str(&self.ssl_mode).map_err(|e| {
                        ConfigError::invalid("DB_SSLMODE", &self.ssl_mode, e.to_string())
                    })?,
                ),
        };

        let statement_timeout = self.statement_timeout.as_millis().to_string();
        Ok(options.options([("statement_timeout", statement_timeout.as_str())]))
    }

    /// Open a pool with the configured limits. Connections are established lazily.
    pub fn connect_pool(&self) -> Result<PgPool, ConfigError> {
        let options = self.connect_options()?;
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(options))
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string())),
    }
}

fn millis_or(key: &'static str, raw: Option<String>, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(key, raw, default_ms)?;
    if ms == 0 {
        return Err(ConfigError::invalid(key, "0", "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

/// Lookup over a fixed map; handy for tests and embedding.
pub fn lookup_from(vars: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key: &str| vars.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(lookup_from(vars))
    }

    #[test]
    fn defaults_match_the_service_contract() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.ssl_mode, "disable");
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.statement_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.operation_timeout, Duration::from_secs(10));
        assert_eq!(cfg.balance_after_policy, BalanceAfterPolicy::Verified);
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.api_port, 8002);
        assert!(cfg.database.url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("LEDGER_STORE", "memory"),
            ("LEDGER_BALANCE_AFTER_POLICY", "trusted"),
            ("LEDGER_OPERATION_TIMEOUT_MS", "250"),
            ("PUBLIC_API_PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(cfg.database.host, "db.internal");
        assert_eq!(cfg.database.port, 6543);
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.balance_after_policy, BalanceAfterPolicy::Trusted);
        assert_eq!(cfg.operation_timeout, Duration::from_millis(250));
        assert_eq!(cfg.api_port, 9000);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = config(&[("DB_PORT", ""), ("DATABASE_URL", " ")]).unwrap();
        assert_eq!(cfg.database.port, 5432);
        assert!(cfg.database.url.is_none());
    }

    #[test]
    fn malformed_values_name_the_key() {
        let err = config(&[("DB_PORT", "five")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_PORT", .. }));

        let err = config(&[("LEDGER_STORE", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LEDGER_STORE", .. }));

        let err = config(&[("LEDGER_OPERATION_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LEDGER_OPERATION_TIMEOUT_MS", .. }));

        let err = config(&[("DB_SSLMODE", "sometimes")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_SSLMODE", .. }));
    }

    #[test]
    fn database_url_is_accepted() {
        let cfg = config(&[("DATABASE_URL", "postgres://u:p@db:5433/ledger")]).unwrap();
        assert!(cfg.database.connect_options().is_ok());
    }
}
