//! Agent ingest socket: `GET /ws/agent/{robot_id}`.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade -> register the robot as connected
//! 2. Each text frame -> `services::ingest::process_agent_text`
//! 3. Close (or read error) -> end the active session, unregister
//!
//! Agents never receive frames on this socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::{debug, error, warn};

use crate::services::ingest::{self, IngestError};
use crate::state::AppState;

pub async fn handle_agent_ws(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_agent_ws(socket, state, robot_id))
}

async fn run_agent_ws(mut socket: WebSocket, state: AppState, robot_id: String) {
    let mut conn = ingest::open(&state, &robot_id).await;

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%robot_id, error = %e, "agent socket read failed");
                break;
            }
        };
        match msg {
            Message::Text(text) => match ingest::process_agent_text(&state, &mut conn, &text).await {
                Ok(()) => {}
                Err(IngestError::Decode(e)) => warn!(%robot_id, error = %e, "invalid agent event"),
                Err(IngestError::Store(e)) => error!(%robot_id, error = %e, "failed to record agent event"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    ingest::finish(&state, conn).await;
}
