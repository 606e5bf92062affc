//! Terminal dashboard: live feed, session browser, and replay.
//!
//! `LiveFeed` keeps the same bounded views a browser dashboard would: the
//! newest 100 telemetry digests in arrival order and the newest 50 failure
//! alerts, newest first.

pub mod client;
pub mod render;
pub mod replay;

use std::collections::VecDeque;

use events::{DashboardEvent, FailureAlert, FailureRecord, LiveTelemetry, SessionSummary};
use tracing::{debug, warn};

pub use replay::Replay;

pub const TELEMETRY_WINDOW: usize = 100;
pub const FAILURE_LIST_MAX: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

/// A failure alert and the robot it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
    pub robot_id: String,
    pub alert: FailureAlert,
}

#[derive(Debug, Default)]
pub struct LiveFeed {
    telemetry: VecDeque<LiveTelemetry>,
    failures: VecDeque<AlertEntry>,
    sessions: Vec<SessionSummary>,
    connection: ConnectionState,
}

impl LiveFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &DashboardEvent) {
        match event {
            DashboardEvent::Telemetry(sample) => {
                self.telemetry.push_back(sample.clone());
                while self.telemetry.len() > TELEMETRY_WINDOW {
                    self.telemetry.pop_front();
                }
            }
            DashboardEvent::Failure { robot_id, failure } => {
                self.failures.push_front(AlertEntry { robot_id: robot_id.clone(), alert: failure.clone() });
                self.failures.truncate(FAILURE_LIST_MAX);
            }
            DashboardEvent::Subscribed { robot_id } => debug!(%robot_id, "subscribed"),
            DashboardEvent::Unsubscribed { robot_id } => debug!(%robot_id, "unsubscribed"),
            DashboardEvent::Error { message } => warn!(%message, "server rejected command"),
        }
    }

    /// Replace the alert list with REST results (newest first).
    pub fn set_failures(&mut self, records: &[FailureRecord]) {
        self.failures = records
            .iter()
            .take(FAILURE_LIST_MAX)
            .map(|record| AlertEntry { robot_id: record.robot_id.clone(), alert: FailureAlert::from(record) })
            .collect();
    }

    pub fn set_sessions(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = sessions;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connection = if connected { ConnectionState::Connected } else { ConnectionState::Disconnected };
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn telemetry(&self) -> impl ExactSizeIterator<Item = &LiveTelemetry> {
        self.telemetry.iter()
    }

    pub fn failures(&self) -> impl ExactSizeIterator<Item = &AlertEntry> {
        self.failures.iter()
    }

    #[must_use]
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
