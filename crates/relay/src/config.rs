//! Relay configuration loaded from environment variables.

use crate::retry::RetryPolicy;
use crate::worker::RelayConfig;

/// Relay process settings with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL` — PostgreSQL connection string (no default)
/// - `RELAY_WORKERS` — number of worker loops (default: `2`)
/// - `RELAY_POLL_INTERVAL_MS` — idle poll sleep (default: `500`)
/// - `RELAY_BATCH_SIZE` — rows claimed per poll (default: `32`)
/// - `RELAY_LEASE_SECONDS` — claim lease length (default: `30`)
/// - `RELAY_HANDLER_CONCURRENCY` — rows processed concurrently per
///   batch (default: `8`)
/// - `RELAY_MAX_RETRIES` — dead-letter ceiling (default: `5`)
/// - `RELAY_BACKOFF_BASE_MS` / `RELAY_BACKOFF_CAP_MS` — exponential
///   backoff bounds (defaults: `2000` / `300000`)
/// - `HOST` / `PORT` — operational HTTP bind address (defaults:
///   `0.0.0.0` / `3100`)
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub workers: usize,
    pub host: String,
    pub port: u16,
    pub worker_config: RelayConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl RelaySettings {
    /// Loads settings from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let retry = RetryPolicy::new(
            env_parse("RELAY_MAX_RETRIES", 5),
            chrono::Duration::milliseconds(env_parse("RELAY_BACKOFF_BASE_MS", 2000)),
            chrono::Duration::milliseconds(env_parse("RELAY_BACKOFF_CAP_MS", 300_000)),
        );

        let worker_config = RelayConfig {
            poll_interval: std::time::Duration::from_millis(env_parse(
                "RELAY_POLL_INTERVAL_MS",
                500,
            )),
            batch_size: env_parse("RELAY_BATCH_SIZE", 32),
            lease_duration: chrono::Duration::seconds(env_parse("RELAY_LEASE_SECONDS", 30)),
            handler_concurrency: env_parse("RELAY_HANDLER_CONCURRENCY", 8),
            retry,
        };

        Self {
            workers: env_parse("RELAY_WORKERS", 2),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3100),
            worker_config,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            workers: 2,
            host: "0.0.0.0".to_string(),
            port: 3100,
            worker_config: RelayConfig::default(),
        }
    }
}
