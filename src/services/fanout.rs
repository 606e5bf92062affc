//! Dashboard subscriber registry and robot-scoped broadcast.
//!
//! DESIGN
//! ======
//! Dashboards subscribe to individual robots. Broadcast is best-effort:
//! a full client queue drops the event for that client only, and a closed
//! queue (socket task gone) removes the client from the registry.

use events::DashboardEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

/// Add `client_id` to the subscriber set for `robot_id`.
pub async fn subscribe(
    state: &AppState,
    robot_id: &str,
    client_id: Uuid,
    tx: mpsc::Sender<DashboardEvent>,
) {
    let mut subscribers = state.subscribers.write().await;
    subscribers
        .entry(robot_id.to_owned())
        .or_default()
        .insert(client_id, tx);
    debug!(%robot_id, %client_id, "dashboard subscribed");
}

/// Remove `client_id` from one robot. Returns whether it was subscribed.
pub async fn unsubscribe(state: &AppState, robot_id: &str, client_id: Uuid) -> bool {
    let mut subscribers = state.subscribers.write().await;
    let Some(clients) = subscribers.get_mut(robot_id) else {
        return false;
    };
    let removed = clients.remove(&client_id).is_some();
    if clients.is_empty() {
        subscribers.remove(robot_id);
    }
    removed
}

/// Remove `client_id` from every robot it subscribed to.
pub async fn remove_client(state: &AppState, client_id: Uuid) {
    let mut subscribers = state.subscribers.write().await;
    for clients in subscribers.values_mut() {
        clients.remove(&client_id);
    }
    subscribers.retain(|_, clients| !clients.is_empty());
}

/// Send `event` to every dashboard subscribed to `robot_id`.
///
/// Returns the number of clients the event was queued for.
pub async fn broadcast(state: &AppState, robot_id: &str, event: &DashboardEvent) -> usize {
    let mut closed = Vec::new();
    let mut delivered = 0;
    {
        let subscribers = state.subscribers.read().await;
        let Some(clients) = subscribers.get(robot_id) else {
            return 0;
        };
        for (client_id, tx) in clients {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                // Best-effort: a slow dashboard misses this event.
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => closed.push(*client_id),
            }
        }
    }

    if !closed.is_empty() {
        let mut subscribers = state.subscribers.write().await;
        if let Some(clients) = subscribers.get_mut(robot_id) {
            for client_id in &closed {
                clients.remove(client_id);
            }
            if clients.is_empty() {
                subscribers.remove(robot_id);
            }
        }
        debug!(%robot_id, pruned = closed.len(), "pruned closed dashboard subscribers");
    }

    delivered
}

/// Number of dashboards currently subscribed to `robot_id`.
#[cfg(test)]
pub async fn subscriber_count(state: &AppState, robot_id: &str) -> usize {
    state
        .subscribers
        .read()
        .await
        .get(robot_id)
        .map_or(0, std::collections::HashMap::len)
}

#[cfg(test)]
#[path = "fanout_test.rs"]
mod tests;
