//! Telemetry store: sessions, per-session telemetry, and failure records.
//!
//! DESIGN
//! ======
//! Route handlers and the ingest service only see the `Store` trait. Two
//! backends implement it:
//! - `MemoryStore`: bounded, process-local. Default when no database is
//!   configured. Keeps the newest N points per session and newest M failures.
//! - `PgStore`: Postgres via SQLx, schema in `src/db/migrations`.
//!
//! QUERY CONTRACT
//! ==============
//! - Sessions: newest `started_at` first, each carrying its failure count.
//! - Failures: newest `detected_at` first.
//! - Session telemetry: oldest first (replay order). Unknown sessions yield an
//!   empty list rather than an error.
//! - `create_session` on an existing id resumes it: `ended_at` is cleared and
//!   metadata replaced, `started_at` is kept. Agents reuse their session id
//!   across reconnects.

pub mod memory;
pub mod postgres;

use events::{FailureRecord, FailureType, SessionSummary, Severity, TelemetryData, TelemetryPoint};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Default page sizes for list queries.
pub const DEFAULT_SESSION_LIMIT: usize = 50;
pub const DEFAULT_FAILURE_LIMIT: usize = 100;
pub const DEFAULT_TELEMETRY_LIMIT: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// A failure about to be recorded. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFailure {
    pub session_id: Uuid,
    pub robot_id: String,
    pub detected_at: OffsetDateTime,
    pub failure_type: FailureType,
    pub severity: Severity,
    pub confidence: f64,
    pub summary: String,
    pub detail: String,
    pub affected_components: Value,
    pub classifier_data: Value,
}

impl NewFailure {
    #[must_use]
    pub fn into_record(self, id: Uuid) -> FailureRecord {
        FailureRecord {
            id,
            session_id: self.session_id,
            robot_id: self.robot_id,
            detected_at: self.detected_at,
            failure_type: self.failure_type,
            severity: self.severity,
            confidence: self.confidence,
            summary: self.summary,
            detail: self.detail,
            affected_components: self.affected_components,
            classifier_data: self.classifier_data,
        }
    }
}

/// Persistence seam for everything the server records.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Open (or resume) a recording session.
    async fn create_session(
        &self,
        session_id: Uuid,
        robot_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionSummary, StoreError>;

    /// Mark a session as ended now. Unknown ids are ignored.
    async fn end_session(&self, session_id: Uuid) -> Result<(), StoreError>;

    async fn list_sessions(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<SessionSummary>, StoreError>;

    async fn insert_telemetry(
        &self,
        session_id: Uuid,
        robot_id: &str,
        time: OffsetDateTime,
        data: &TelemetryData,
    ) -> Result<(), StoreError>;

    async fn session_telemetry(&self, session_id: Uuid, limit: usize) -> Result<Vec<TelemetryPoint>, StoreError>;

    async fn insert_failure(&self, failure: NewFailure) -> Result<FailureRecord, StoreError>;

    async fn list_failures(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<FailureRecord>, StoreError>;
}

/// Project a full telemetry payload onto the replay columns.
#[must_use]
pub fn telemetry_point(time: OffsetDateTime, data: &TelemetryData) -> TelemetryPoint {
    TelemetryPoint {
        time,
        model_confidence: data.model_confidence(),
        task_phase: data.task_phase().map(str::to_owned),
        battery_percent: data.battery_percent(),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
