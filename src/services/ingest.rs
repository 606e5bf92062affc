//! Agent ingest: one `AgentConnection` per `/ws/agent/{robot_id}` socket.
//!
//! DESIGN
//! ======
//! The socket task in `routes::agent_ws` only moves text frames in and out;
//! everything an agent event causes happens here so it can be tested
//! without a socket.
//!
//! PIPELINE (telemetry)
//! ====================
//! store telemetry -> classify -> (store failure -> broadcast `failure`)
//! -> broadcast `telemetry`. Dashboards therefore always see a failure
//! before the sample that caused it.
//!
//! ERROR HANDLING
//! ==============
//! Errors are per-message. The caller logs them and keeps reading; an agent
//! connection is never closed because one event was bad.

use events::{AgentEvent, DashboardEvent, EventError, FailureAlert, LiveTelemetry, TelemetryData};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::{fanout, fleet};
use crate::state::AppState;
use crate::store::{NewFailure, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid agent event: {0}")]
    Decode(#[from] EventError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-socket ingest state.
#[derive(Debug)]
pub struct AgentConnection {
    pub robot_id: String,
    pub connection_id: Uuid,
    /// Set by `session_start`; telemetry before it is ignored.
    pub session_id: Option<Uuid>,
}

/// Register a freshly upgraded agent socket.
pub async fn open(state: &AppState, robot_id: &str) -> AgentConnection {
    let connection_id = Uuid::new_v4();
    fleet::connect(state, robot_id, connection_id).await;
    info!(%robot_id, %connection_id, "agent connected");
    AgentConnection { robot_id: robot_id.to_owned(), connection_id, session_id: None }
}

/// Decode and apply one inbound text frame.
///
/// # Errors
///
/// Returns `Decode` for malformed JSON and `Store` when persistence fails.
pub async fn process_agent_text(state: &AppState, conn: &mut AgentConnection, text: &str) -> Result<(), IngestError> {
    let event: AgentEvent = events::decode(text)?;

    match event {
        AgentEvent::SessionStart { session_id, metadata, .. } => start_session(state, conn, session_id, metadata).await,
        AgentEvent::Telemetry { timestamp, data, .. } => {
            let Some(session_id) = conn.session_id else {
                debug!(robot_id = %conn.robot_id, "telemetry before session_start; ignored");
                return Ok(());
            };
            ingest_telemetry(state, conn, session_id, timestamp, &data).await
        }
        AgentEvent::Heartbeat { data, .. } => {
            fleet::record_heartbeat(state, &conn.robot_id, conn.connection_id, data).await;
            Ok(())
        }
        AgentEvent::Error { data, .. } => {
            warn!(robot_id = %conn.robot_id, error_type = %data.error_type, error_msg = %data.error_msg, "agent reported error");
            fleet::touch(state, &conn.robot_id, conn.connection_id).await;
            Ok(())
        }
        AgentEvent::Unknown => {
            debug!(robot_id = %conn.robot_id, "ignoring unknown agent event type");
            Ok(())
        }
    }
}

/// Socket closed: drop the registry entry and end the session, unless a
/// newer connection from the same agent has already resumed it.
pub async fn finish(state: &AppState, conn: AgentConnection) {
    if fleet::disconnect(state, &conn.robot_id, conn.connection_id).await {
        state.classifier.lock().await.forget(&conn.robot_id);
    }
    if let Some(session_id) = conn.session_id {
        if fleet::session_in_use(state, session_id).await {
            debug!(robot_id = %conn.robot_id, %session_id, "session resumed by newer connection; left open");
        } else {
            match state.store.end_session(session_id).await {
                Ok(()) => info!(robot_id = %conn.robot_id, %session_id, "session ended"),
                Err(e) => warn!(robot_id = %conn.robot_id, %session_id, error = %e, "failed to end session"),
            }
        }
    }
    info!(robot_id = %conn.robot_id, connection_id = %conn.connection_id, "agent disconnected");
}

async fn start_session(
    state: &AppState,
    conn: &mut AgentConnection,
    session_id: Option<Uuid>,
    metadata: Map<String, Value>,
) -> Result<(), IngestError> {
    let session_id = session_id.unwrap_or_else(Uuid::new_v4);

    if let Some(previous) = conn.session_id.filter(|p| *p != session_id) {
        state.store.end_session(previous).await?;
        info!(robot_id = %conn.robot_id, session_id = %previous, "session superseded");
    }

    let session = state
        .store
        .create_session(session_id, &conn.robot_id, metadata)
        .await?;
    conn.session_id = Some(session.id);
    fleet::set_session(state, &conn.robot_id, conn.connection_id, session.id).await;
    info!(robot_id = %conn.robot_id, %session_id, "session started");
    Ok(())
}

async fn ingest_telemetry(
    state: &AppState,
    conn: &AgentConnection,
    session_id: Uuid,
    timestamp: OffsetDateTime,
    data: &TelemetryData,
) -> Result<(), IngestError> {
    let robot_id = conn.robot_id.as_str();
    state
        .store
        .insert_telemetry(session_id, robot_id, timestamp, data)
        .await?;
    fleet::touch(state, robot_id, conn.connection_id).await;

    let classification = state.classifier.lock().await.classify(robot_id, data);
    if let Some(found) = classification {
        warn!(%robot_id, failure_type = %found.failure_type, severity = %found.severity, summary = %found.summary, "failure detected");
        let record = state
            .store
            .insert_failure(NewFailure {
                session_id,
                robot_id: robot_id.to_owned(),
                detected_at: timestamp,
                failure_type: found.failure_type,
                severity: found.severity,
                confidence: found.confidence,
                summary: found.summary,
                detail: found.detail,
                affected_components: found.affected_components,
                classifier_data: found.classifier_data,
            })
            .await?;
        let event = DashboardEvent::Failure { robot_id: robot_id.to_owned(), failure: FailureAlert::from(&record) };
        fanout::broadcast(state, robot_id, &event).await;
    }

    let live = DashboardEvent::Telemetry(LiveTelemetry {
        robot_id: robot_id.to_owned(),
        timestamp,
        model_confidence: data.model_confidence(),
        battery_percent: data.battery_percent(),
        task_phase: data.task_phase().map(str::to_owned),
    });
    fanout::broadcast(state, robot_id, &live).await;
    Ok(())
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
