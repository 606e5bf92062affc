//! Shared wire model for the RobotBlackBox agent, server, and dashboards.
//!
//! This crate owns the JSON representation used on both WebSocket channels
//! (`/ws/agent/{robot_id}` and `/ws/dashboard`) and the REST query API.
//! Every socket message is a JSON text frame discriminated by `type`.
//!
//! DESIGN
//! ======
//! - Telemetry payloads are typed but fully optional: agents report whatever
//!   their collector can observe, and a `null` joint position is meaningful
//!   (encoder dropout), so joint arrays are `Vec<Option<f64>>`.
//! - Timestamps travel as RFC 3339 strings.
//! - Unknown agent event types decode to [`AgentEvent::Unknown`] so newer
//!   agents never break older servers.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// PATHS
// =============================================================================

/// Path prefix for agent ingest sockets. The robot id is the final segment.
pub const AGENT_WS_PREFIX: &str = "/ws/agent";

/// Path for dashboard subscription sockets.
pub const DASHBOARD_WS_PATH: &str = "/ws/dashboard";

/// Error returned by [`decode`] and [`encode`].
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one JSON text frame.
///
/// # Errors
///
/// Returns [`EventError::Json`] if the text is not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, EventError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode one value as a JSON text frame.
///
/// # Errors
///
/// Returns [`EventError::Json`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<String, EventError> {
    Ok(serde_json::to_string(value)?)
}

// =============================================================================
// TELEMETRY PAYLOAD
// =============================================================================

/// Joint readings, index-aligned across arrays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointState {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub positions_rad: Vec<Option<f64>>,
    pub velocities_rad_s: Vec<Option<f64>>,
    pub torques_nm: Vec<Option<f64>>,
    pub temperatures_c: Vec<Option<f64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperState {
    pub position_mm: Option<f64>,
    pub force_n: Option<f64>,
    pub contact_detected: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskState {
    pub current_task: Option<String>,
    pub phase: Option<String>,
    pub phase_progress: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelState {
    pub action_confidence: Option<f64>,
    pub inference_time_ms: Option<f64>,
    pub predicted_action: Option<String>,
    pub uncertainty: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemState {
    /// Robot-local clock reading, passed through untouched.
    pub timestamp_robot: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
    pub battery_percent: Option<f64>,
}

/// One telemetry snapshot as produced by a collector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joints: Option<JointState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gripper: Option<GripperState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemState>,
}

impl TelemetryData {
    #[must_use]
    pub fn model_confidence(&self) -> Option<f64> {
        self.model.as_ref().and_then(|m| m.action_confidence)
    }

    #[must_use]
    pub fn battery_percent(&self) -> Option<f64> {
        self.system.as_ref().and_then(|s| s.battery_percent)
    }

    #[must_use]
    pub fn task_phase(&self) -> Option<&str> {
        self.task.as_ref().and_then(|t| t.phase.as_deref())
    }
}

/// Host health reported by the agent every few seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatData {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    /// Events currently held in the agent's offline buffer.
    pub buffer_size: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentErrorData {
    pub error_type: String,
    pub error_msg: String,
}

// =============================================================================
// AGENT -> SERVER
// =============================================================================

/// Events sent by an agent over `/ws/agent/{robot_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    SessionStart {
        /// Server assigns a fresh id when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        timestamp: Option<OffsetDateTime>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Telemetry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        #[serde(default)]
        data: TelemetryData,
    },
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        timestamp: Option<OffsetDateTime>,
        #[serde(default)]
        data: HeartbeatData,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        timestamp: Option<OffsetDateTime>,
        #[serde(default)]
        data: AgentErrorData,
    },
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// Wire name of the event type, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Telemetry { .. } => "telemetry",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// DASHBOARD <-> SERVER
// =============================================================================

/// Commands sent by a dashboard over `/ws/dashboard`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardCommand {
    Subscribe {
        #[serde(default)]
        robot_id: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        robot_id: Option<String>,
    },
}

/// Live telemetry digest pushed to dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveTelemetry {
    pub robot_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub model_confidence: Option<f64>,
    pub battery_percent: Option<f64>,
    pub task_phase: Option<String>,
}

/// Compact failure notice pushed to dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureAlert {
    pub id: Uuid,
    pub failure_type: FailureType,
    pub severity: Severity,
    pub summary: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&FailureRecord> for FailureAlert {
    fn from(record: &FailureRecord) -> Self {
        Self {
            id: record.id,
            failure_type: record.failure_type,
            severity: record.severity,
            summary: record.summary.clone(),
            timestamp: record.detected_at,
        }
    }
}

/// Events pushed by the server over `/ws/dashboard`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    Subscribed { robot_id: String },
    Unsubscribed { robot_id: String },
    Telemetry(LiveTelemetry),
    Failure { robot_id: String, failure: FailureAlert },
    Error { message: String },
}

// =============================================================================
// FAILURE TAXONOMY
// =============================================================================

/// Subsystem a detected failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    Sensor,
    Motor,
    Model,
    System,
    Thermal,
}

impl FailureType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Motor => "motor",
            Self::Model => "model",
            Self::System => "system",
            Self::Thermal => "thermal",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sensor" => Some(Self::Sensor),
            "motor" => Some(Self::Motor),
            "model" => Some(Self::Model),
            "system" => Some(Self::System),
            "thermal" => Some(Self::Thermal),
            _ => None,
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure severity, ordered from least to most urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// REST MODELS
// =============================================================================

/// A recording session: one agent connection's worth of telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub robot_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub failure_count: u64,
}

/// One replayable sample from a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub model_confidence: Option<f64>,
    pub task_phase: Option<String>,
    pub battery_percent: Option<f64>,
}

/// A stored failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub robot_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
    pub failure_type: FailureType,
    pub severity: Severity,
    pub confidence: f64,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub affected_components: Value,
    #[serde(default)]
    pub classifier_data: Value,
}

/// A currently connected agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub robot_id: String,
    pub session_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub heartbeat: Option<HeartbeatData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryResponse {
    pub session_id: Uuid,
    pub telemetry: Vec<TelemetryPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailuresResponse {
    pub failures: Vec<FailureRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotsResponse {
    pub robots: Vec<RobotStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
