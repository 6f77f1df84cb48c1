//! Runtime configuration for the ledger store.
//!
//! Values come from the process environment. Every knob except the database
//! URL has a default, so tests and the in-memory backend can run with
//! [`LedgerConfig::default`].

use std::time::Duration;

use thiserror::Error;

use crate::outbox::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Connection pool and per-statement limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long `begin` may wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// Upper bound for any single statement.
    pub statement_timeout: Duration,
    /// Upper bound for any single row-lock wait.
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl LedgerConfig {
    /// Read `DATABASE_URL` plus the optional `DB_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
            acquire_timeout: millis_or(&lookup, "DB_ACQUIRE_TIMEOUT_MS", defaults.acquire_timeout)?,
            statement_timeout: millis_or(
                &lookup,
                "DB_STATEMENT_TIMEOUT_MS",
                defaults.statement_timeout,
            )?,
            lock_timeout: millis_or(&lookup, "DB_LOCK_TIMEOUT_MS", defaults.lock_timeout)?,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, name, default_ms).map(Duration::from_millis)
}

/// Outbox dispatcher loop settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between polls when the outbox is empty.
    pub poll_interval: Duration,
    /// Maximum messages claimed per transaction.
    pub batch_size: u32,
    /// Name for logging.
    pub name: String,
    pub retry_policy: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            batch_size: 32,
            name: "outbox-dispatcher".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            LedgerConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_apply_and_defaults_fill_the_rest() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_LOCK_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.max_connections, 4);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.acquire_timeout, LedgerConfig::default().acquire_timeout);
    }

    #[test]
    fn garbage_values_are_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("DB_STATEMENT_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "DB_STATEMENT_TIMEOUT_MS",
                value: "soon".to_string()
            }
        );
    }
}
