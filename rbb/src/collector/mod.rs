//! Telemetry sources.
//!
//! A collector turns whatever the robot exposes into one [`TelemetryData`]
//! snapshot per call. The agent owns the collector and calls it from its
//! collect loop at the configured rate.

pub mod mock;

use events::TelemetryData;
use tracing::{info, warn};

pub use mock::MockCollector;

use crate::config::AgentConfig;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("failed to read telemetry: {0}")]
    Read(String),
}

impl CollectorError {
    /// Value reported as `error_type` in the agent's `error` event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read(_) => "collector_read",
        }
    }
}

pub trait Collector: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Take one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read this tick; the agent
    /// reports it and keeps collecting.
    fn snapshot(&mut self) -> Result<TelemetryData, CollectorError>;
}

/// Pick the collector for this configuration. Only the simulated arm ships
/// with `rbb`; a hardware request falls back to it with a warning.
#[must_use]
pub fn from_config(config: &AgentConfig) -> Box<dyn Collector> {
    if config.use_mock {
        info!("using mock collector");
    } else {
        warn!("no hardware collector available; falling back to mock collector");
    }
    Box::new(MockCollector::new())
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
