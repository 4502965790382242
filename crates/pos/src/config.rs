//! Service configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Service configuration.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json` (default `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `METRICS_ADDR`: Prometheus scrape listener, e.g. `0.0.0.0:9000`; unset disables it
/// - `MAX_CONFLICT_RETRIES`: re-decides after losing a table race (default 3)
/// - `SEED_FILE`: JSON file with tables and menu items to load at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
    pub max_conflict_retries: u32,
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let log_format = match get("LOG_FORMAT") {
            None => defaults.log_format,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "pretty" | "text" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", v, "expected `pretty` or `json`")),
            },
        };

        let metrics_addr = match get("METRICS_ADDR") {
            None => None,
            Some(v) => Some(
                v.parse()
                    .map_err(|e: std::net::AddrParseError| invalid("METRICS_ADDR", v.clone(), e))?,
            ),
        };

        let max_conflict_retries = match get("MAX_CONFLICT_RETRIES") {
            None => defaults.max_conflict_retries,
            Some(v) => v
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid("MAX_CONFLICT_RETRIES", v.clone(), e))?,
        };

        Ok(Self {
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: get("DATABASE_URL"),
            metrics_addr,
            max_conflict_retries,
            seed_file: get("SEED_FILE").map(PathBuf::from),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            metrics_addr: None,
            max_conflict_retries: 3,
            seed_file: None,
        }
    }
}

fn invalid(var: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_conflict_retries, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = from(&[
            ("RUST_LOG", "pos=debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://pos@localhost/pos"),
            ("METRICS_ADDR", "127.0.0.1:9000"),
            ("MAX_CONFLICT_RETRIES", "5"),
            ("SEED_FILE", "seed/cafe.json"),
        ])
        .unwrap();

        assert_eq!(config.log_level, "pos=debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://pos@localhost/pos"));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.seed_file, Some(PathBuf::from("seed/cafe.json")));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = from(&[("DATABASE_URL", ""), ("MAX_CONFLICT_RETRIES", "  ")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = from(&[("MAX_CONFLICT_RETRIES", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MAX_CONFLICT_RETRIES", .. }));

        let err = from(&[("METRICS_ADDR", "localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "METRICS_ADDR", .. }));

        let err = from(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().starts_with("LOG_FORMAT=\"xml\" is invalid"));
    }
}
