//! Dashboard socket: `GET /ws/dashboard`.
//!
//! DESIGN
//! ======
//! On upgrade the connection gets a client id and a bounded outbound
//! channel, then enters a `select!` loop:
//! - inbound `subscribe` / `unsubscribe` commands -> fanout registry
//! - events broadcast by agent ingest -> forwarded to the socket
//!
//! On close the client is removed from every robot it subscribed to.

use std::collections::HashSet;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use events::{DashboardCommand, DashboardEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::fanout;
use crate::state::AppState;

pub async fn handle_dashboard_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_dashboard_ws(socket, state))
}

async fn run_dashboard_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<DashboardEvent>(state.dashboard_channel_capacity);
    let mut subscribed = HashSet::new();

    info!(%client_id, "dashboard connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_dashboard_text(&state, client_id, &client_tx, &mut subscribed, &text).await;
                        for reply in &replies {
                            if let Err(e) = send_event(&mut socket, reply).await {
                                debug!(%client_id, error = %e, "dashboard send failed");
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if let Err(e) = send_event(&mut socket, &event).await {
                    debug!(%client_id, error = %e, "dashboard send failed");
                    break;
                }
            }
        }
    }

    fanout::remove_client(&state, client_id).await;
    info!(%client_id, robots = subscribed.len(), "dashboard disconnected");
}

/// Apply one inbound dashboard command and return the replies for the sender.
async fn process_dashboard_text(
    state: &AppState,
    client_id: Uuid,
    client_tx: &mpsc::Sender<DashboardEvent>,
    subscribed: &mut HashSet<String>,
    text: &str,
) -> Vec<DashboardEvent> {
    let command: DashboardCommand = match events::decode(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(%client_id, error = %e, "invalid dashboard command");
            return vec![DashboardEvent::Error { message: e.to_string() }];
        }
    };

    match command {
        DashboardCommand::Subscribe { robot_id } => {
            let Some(robot_id) = robot_id.filter(|r| !r.is_empty()) else {
                debug!(%client_id, "subscribe without robot_id; ignored");
                return Vec::new();
            };
            fanout::subscribe(state, &robot_id, client_id, client_tx.clone()).await;
            subscribed.insert(robot_id.clone());
            vec![DashboardEvent::Subscribed { robot_id }]
        }
        DashboardCommand::Unsubscribe { robot_id } => {
            let Some(robot_id) = robot_id.filter(|r| !r.is_empty()) else {
                return Vec::new();
            };
            fanout::unsubscribe(state, &robot_id, client_id).await;
            subscribed.remove(&robot_id);
            vec![DashboardEvent::Unsubscribed { robot_id }]
        }
    }
}

/// Only socket failures are errors; an event that cannot be encoded is
/// logged and skipped.
async fn send_event(socket: &mut WebSocket, event: &DashboardEvent) -> Result<(), axum::Error> {
    match event_frame(event) {
        Some(frame) => socket.send(frame).await,
        None => Ok(()),
    }
}

fn event_frame(event: &DashboardEvent) -> Option<Message> {
    match events::encode(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, "failed to serialize dashboard event");
            None
        }
    }
}

#[cfg(test)]
#[path = "dashboard_ws_test.rs"]
mod tests;
