//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use fulfillment::FulfillmentSettings;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL store when set, in-memory store otherwise
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `RPC_TIMEOUT_MS` — per-call deadline for sibling services (default: `2000`)
/// - `ESTIMATED_DELIVERY_MINUTES` — estimate set on the way (default: `30`)
/// - `OUTBOX_POLL_INTERVAL_SECS` — relay sweep interval (default: `5`)
/// - `OUTBOX_MAX_ATTEMPTS` — attempts before a message is failed (default: `5`)
/// - `RECONCILE_INTERVAL_SECS` — payment reconciliation interval (default: `60`)
/// - `NOTIFICATION_SENDER` — sender address of emails
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub rpc_timeout_ms: u64,
    pub estimated_delivery_minutes: i64,
    pub outbox_poll_interval_secs: u64,
    pub outbox_max_attempts: u32,
    pub reconcile_interval_secs: u64,
    pub notification_sender: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable values fall back to their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_parse("LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            rpc_timeout_ms: env_parse("RPC_TIMEOUT_MS").unwrap_or(defaults.rpc_timeout_ms),
            estimated_delivery_minutes: env_parse("ESTIMATED_DELIVERY_MINUTES")
                .unwrap_or(defaults.estimated_delivery_minutes),
            outbox_poll_interval_secs: env_parse("OUTBOX_POLL_INTERVAL_SECS")
                .unwrap_or(defaults.outbox_poll_interval_secs),
            outbox_max_attempts: env_parse("OUTBOX_MAX_ATTEMPTS")
                .unwrap_or(defaults.outbox_max_attempts),
            reconcile_interval_secs: env_parse("RECONCILE_INTERVAL_SECS")
                .unwrap_or(defaults.reconcile_interval_secs),
            notification_sender: std::env::var("NOTIFICATION_SENDER")
                .unwrap_or(defaults.notification_sender),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tunables for the fulfillment services and workers.
    pub fn settings(&self) -> FulfillmentSettings {
        FulfillmentSettings {
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            estimated_delivery_minutes: self.estimated_delivery_minutes,
            outbox_max_attempts: self.outbox_max_attempts,
            outbox_poll_interval: Duration::from_secs(self.outbox_poll_interval_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            ..FulfillmentSettings::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            rpc_timeout_ms: 2000,
            estimated_delivery_minutes: 30,
            outbox_poll_interval_secs: 5,
            outbox_max_attempts: 5,
            reconcile_interval_secs: 60,
            notification_sender: "orders@fooddelivery.local".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
