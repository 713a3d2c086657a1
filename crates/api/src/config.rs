//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use settlement::{DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_CURRENCY, DEFAULT_ROUTING_TIMEOUT, EngineConfig};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; unset keeps events in memory
/// - `ZONES_FILE`: JSON array of delivery zones
/// - `ROUTING_TIMEOUT_MS`: routing lookup budget (default `2000`)
/// - `AVERAGE_SPEED_KMH`: speed for straight-line estimates (default `25`)
/// - `MAX_COMMIT_ATTEMPTS`: retries on concurrent writes (default `5`)
/// - `WALLET_CURRENCY`: currency of new wallets (default `USD`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub zones_file: Option<PathBuf>,
    pub routing_timeout: Duration,
    pub average_speed_kmh: f64,
    pub max_commit_attempts: u32,
    pub wallet_currency: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            zones_file: non_empty("ZONES_FILE").map(PathBuf::from),
            routing_timeout: non_empty("ROUTING_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.routing_timeout),
            average_speed_kmh: non_empty("AVERAGE_SPEED_KMH")
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(defaults.average_speed_kmh),
            max_commit_attempts: non_empty("MAX_COMMIT_ATTEMPTS")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_commit_attempts),
            wallet_currency: non_empty("WALLET_CURRENCY").unwrap_or(defaults.wallet_currency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_attempts: self.max_commit_attempts,
            currency: self.wallet_currency.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            zones_file: None,
            routing_timeout: DEFAULT_ROUTING_TIMEOUT,
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            max_commit_attempts: engine.max_attempts,
            wallet_currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}
