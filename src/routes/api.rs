//! Read-only REST API over recorded sessions, telemetry, and failures.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use events::{FailuresResponse, HealthResponse, RobotsResponse, SessionsResponse, TelemetryResponse};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::services::fleet;
use crate::state::AppState;
use crate::store::{DEFAULT_FAILURE_LIMIT, DEFAULT_SESSION_LIMIT, DEFAULT_TELEMETRY_LIMIT, StoreError};

/// Upper bound for any `limit` query parameter.
pub const MAX_LIMIT: usize = 10_000;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub robot_id: Option<String>,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn robot_id(&self) -> Option<&str> {
        self.robot_id.as_deref().filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn resolve_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).min(MAX_LIMIT)
}

pub(crate) fn store_error_to_status(err: StoreError) -> StatusCode {
    error!(error = %err, "store query failed");
    match err {
        StoreError::Database(_) | StoreError::Serialize(_) | StoreError::Corrupt(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `GET /` and `GET /api/health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into(), timestamp: OffsetDateTime::now_utc() })
}

/// `GET /api/sessions?robot_id=&limit=`: newest sessions first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionsResponse>, StatusCode> {
    let sessions = state
        .store
        .list_sessions(query.robot_id(), resolve_limit(query.limit, DEFAULT_SESSION_LIMIT))
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(SessionsResponse { sessions }))
}

/// `GET /api/sessions/{session_id}/telemetry?limit=`: oldest point first.
pub async fn session_telemetry(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<TelemetryResponse>, StatusCode> {
    let telemetry = state
        .store
        .session_telemetry(session_id, resolve_limit(query.limit, DEFAULT_TELEMETRY_LIMIT))
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(TelemetryResponse { session_id, telemetry }))
}

/// `GET /api/failures?robot_id=&limit=`: newest failures first.
pub async fn list_failures(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FailuresResponse>, StatusCode> {
    let failures = state
        .store
        .list_failures(query.robot_id(), resolve_limit(query.limit, DEFAULT_FAILURE_LIMIT))
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(FailuresResponse { failures }))
}

/// `GET /api/robots`: agents connected right now.
pub async fn list_robots(State(state): State<AppState>) -> Json<RobotsResponse> {
    Json(RobotsResponse { robots: fleet::list(&state).await })
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
