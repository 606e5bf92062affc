//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the agent ingest socket, the dashboard socket,
//! and the read-only REST API. CORS is wide open: dashboards are served
//! from anywhere and the API has no write endpoints.

pub mod agent_ws;
pub mod api;
pub mod dashboard_ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api::health))
        .route("/api/health", get(api::health))
        .route("/api/sessions", get(api::list_sessions))
        .route("/api/sessions/{session_id}/telemetry", get(api::session_telemetry))
        .route("/api/failures", get(api::list_failures))
        .route("/api/robots", get(api::list_robots))
        .route(&format!("{}/{{robot_id}}", events::AGENT_WS_PREFIX), get(agent_ws::handle_agent_ws))
        .route(events::DASHBOARD_WS_PATH, get(dashboard_ws::handle_dashboard_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
