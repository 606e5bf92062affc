//! Server configuration loaded from environment variables.
//!
//! `main` calls `dotenvy::dotenv()` first, so every key below may also come
//! from a `.env` file in the working directory.

use std::str::FromStr;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DASHBOARD_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_MEMORY_TELEMETRY_PER_SESSION: usize = 1000;
const DEFAULT_MEMORY_FAILURE_CAP: usize = 100;

/// Tuning knobs for the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port to listen on (`PORT`).
    pub port: u16,
    /// Postgres URL (`DATABASE_URL`). The in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Pool size for the Postgres store (`DB_MAX_CONNECTIONS`).
    pub db_max_connections: u32,
    /// Outbound queue depth per dashboard socket (`DASHBOARD_CHANNEL_CAPACITY`).
    pub dashboard_channel_capacity: usize,
    /// Newest points kept per session by the in-memory store (`MEMORY_TELEMETRY_PER_SESSION`).
    pub memory_telemetry_per_session: usize,
    /// Newest failures kept by the in-memory store (`MEMORY_FAILURE_CAP`).
    pub memory_failure_cap: usize,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            dashboard_channel_capacity: env_parse("DASHBOARD_CHANNEL_CAPACITY", DEFAULT_DASHBOARD_CHANNEL_CAPACITY)
                .max(1),
            memory_telemetry_per_session: env_parse(
                "MEMORY_TELEMETRY_PER_SESSION",
                DEFAULT_MEMORY_TELEMETRY_PER_SESSION,
            ),
            memory_failure_cap: env_parse("MEMORY_FAILURE_CAP", DEFAULT_MEMORY_FAILURE_CAP),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            dashboard_channel_capacity: DEFAULT_DASHBOARD_CHANNEL_CAPACITY,
            memory_telemetry_per_session: DEFAULT_MEMORY_TELEMETRY_PER_SESSION,
            memory_failure_cap: DEFAULT_MEMORY_FAILURE_CAP,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
