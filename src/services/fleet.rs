//! Registry of connected agents, served by `GET /api/robots`.

use events::{HeartbeatData, RobotStatus};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::state::{AppState, ConnectedRobot};

/// Register (or replace) the live entry for `robot_id`.
pub async fn connect(state: &AppState, robot_id: &str, connection_id: Uuid) {
    let now = OffsetDateTime::now_utc();
    let previous = state.robots.write().await.insert(
        robot_id.to_owned(),
        ConnectedRobot { connection_id, session_id: None, connected_at: now, last_seen: now, heartbeat: None },
    );
    if previous.is_some() {
        info!(%robot_id, %connection_id, "agent reconnected; replacing previous connection");
    }
}

pub async fn set_session(state: &AppState, robot_id: &str, connection_id: Uuid, session_id: Uuid) {
    with_robot(state, robot_id, connection_id, |robot| robot.session_id = Some(session_id)).await;
}

pub async fn record_heartbeat(state: &AppState, robot_id: &str, connection_id: Uuid, heartbeat: HeartbeatData) {
    with_robot(state, robot_id, connection_id, |robot| robot.heartbeat = Some(heartbeat)).await;
}

/// Refresh `last_seen` only.
pub async fn touch(state: &AppState, robot_id: &str, connection_id: Uuid) {
    with_robot(state, robot_id, connection_id, |_| {}).await;
}

/// Remove the entry, unless a newer connection has already replaced it.
pub async fn disconnect(state: &AppState, robot_id: &str, connection_id: Uuid) -> bool {
    let mut robots = state.robots.write().await;
    if robots.get(robot_id).is_some_and(|r| r.connection_id == connection_id) {
        robots.remove(robot_id);
        return true;
    }
    false
}

/// Whether any registered connection currently holds `session_id`.
pub async fn session_in_use(state: &AppState, session_id: Uuid) -> bool {
    state.robots.read().await.values().any(|r| r.session_id == Some(session_id))
}

/// Connected robots sorted by robot id.
pub async fn list(state: &AppState) -> Vec<RobotStatus> {
    let robots = state.robots.read().await;
    let mut statuses = robots
        .iter()
        .map(|(robot_id, robot)| RobotStatus {
            robot_id: robot_id.clone(),
            session_id: robot.session_id,
            connected_at: robot.connected_at,
            last_seen: robot.last_seen,
            heartbeat: robot.heartbeat.clone(),
        })
        .collect::<Vec<_>>();
    statuses.sort_by(|a, b| a.robot_id.cmp(&b.robot_id));
    statuses
}

async fn with_robot(state: &AppState, robot_id: &str, connection_id: Uuid, update: impl FnOnce(&mut ConnectedRobot)) {
    let mut robots = state.robots.write().await;
    if let Some(robot) = robots.get_mut(robot_id)
        && robot.connection_id == connection_id
    {
        robot.last_seen = OffsetDateTime::now_utc();
        update(robot);
    }
}

#[cfg(test)]
#[path = "fleet_test.rs"]
mod tests;
