//! Server configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Required values (`DATABASE_URL`, `JWT_SECRET`) fail startup when absent.
//! Tuning knobs fall back to their defaults when unset or unparseable, so a
//! typo in an optional variable never takes the server down.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SHAPE_QUEUE_CAPACITY: usize = 8192;
pub const DEFAULT_SHAPE_PERSIST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 200;
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Knobs for the synchronization engine. Copied into `AppState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of shape events waiting for persistence.
    pub queue_capacity: usize,
    /// Upper bound on a single `create_shape` call.
    pub persist_timeout: Duration,
    /// Liveness sweeper period.
    pub sweep_interval: Duration,
    /// Per-connection outbound buffer.
    pub client_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_SHAPE_QUEUE_CAPACITY,
            persist_timeout: Duration::from_millis(DEFAULT_SHAPE_PERSIST_TIMEOUT_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("SHAPE_QUEUE_CAPACITY", DEFAULT_SHAPE_QUEUE_CAPACITY).max(1),
            persist_timeout: Duration::from_millis(env_parse(
                "SHAPE_PERSIST_TIMEOUT_MS",
                DEFAULT_SHAPE_PERSIST_TIMEOUT_MS,
            )),
            sweep_interval: Duration::from_millis(env_parse("SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS).max(1)),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
        }
    }
}

/// Full server configuration.
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Build the server config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `JWT_SECRET` (HS256 secret shared with the token issuer)
    ///
    /// Optional:
    /// - `PORT`: default 8080
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `SHAPE_QUEUE_CAPACITY`, `SHAPE_PERSIST_TIMEOUT_MS`, `SWEEP_INTERVAL_MS`,
    ///   `CLIENT_CHANNEL_CAPACITY`: see [`EngineConfig`]
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset or
    /// empty, and [`ConfigError::Invalid`] when `PORT` is set but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::Invalid { key: "PORT", reason: e.to_string() })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            engine: EngineConfig::from_env(),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
