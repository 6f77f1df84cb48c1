//! Tracing/logging initialization.
//!
//! Output format comes from `HOUSEBANK_LOG_FORMAT` (`json` or `pretty`,
//! default `json`); filtering from `RUST_LOG`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "HOUSEBANK_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log format `{0}` (expected `json` or `pretty`)")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(UnknownLogFormat(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    /// Route output through the test harness's captured writer.
    pub test_writer: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "info".to_string(),
            test_writer: false,
        }
    }
}

impl TracingConfig {
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn for_tests() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_filter: "warn,housebank_infra=debug".to_string(),
            test_writer: true,
        }
    }
}

/// Install the global subscriber. Safe to call multiple times (subsequent
/// calls are no-ops).
pub fn init(config: TracingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match (config.format, config.test_writer) {
        (LogFormat::Json, false) => builder.json().try_init(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init(),
        (LogFormat::Pretty, false) => builder.try_init(),
        (LogFormat::Pretty, true) => builder.with_test_writer().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_formats() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" text ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn repeated_init_is_a_no_op() {
        init(TracingConfig::for_tests());
        init(TracingConfig::default());
    }
}
