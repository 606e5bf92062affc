use super::*;
use crate::state::test_helpers;
use events::{FailureType, Severity};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

async fn assert_channel_has_event(rx: &mut mpsc::Receiver<DashboardEvent>) -> DashboardEvent {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

async fn assert_channel_empty(rx: &mut mpsc::Receiver<DashboardEvent>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no event on channel"
    );
}

fn session_start(session_id: Uuid) -> String {
    json!({
        "type": "session_start",
        "session_id": session_id,
        "robot_id": "robot_001",
        "timestamp": "2024-05-01T08:00:00Z",
        "metadata": {"agent_version": "0.1.0", "hostname": "arm-1"}
    })
    .to_string()
}

fn telemetry(confidence: f64) -> String {
    json!({
        "type": "telemetry",
        "robot_id": "robot_001",
        "timestamp": "2024-05-01T08:00:01.250000Z",
        "data": {
            "model": {"action_confidence": confidence},
            "system": {"battery_percent": 88.0},
            "task": {"phase": "grasping"}
        }
    })
    .to_string()
}

#[tokio::test]
async fn session_start_creates_session_and_registers_robot() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;
    let session_id = Uuid::new_v4();

    process_agent_text(&state, &mut conn, &session_start(session_id)).await.unwrap();

    assert_eq!(conn.session_id, Some(session_id));
    let sessions = state.store.list_sessions(Some("robot_001"), 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].metadata.get("hostname"), Some(&json!("arm-1")));
    assert_eq!(fleet::list(&state).await[0].session_id, Some(session_id));
}

#[tokio::test]
async fn session_start_without_id_gets_fresh_one() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;

    process_agent_text(&state, &mut conn, r#"{"type":"session_start"}"#).await.unwrap();
    assert!(conn.session_id.is_some());
}

#[tokio::test]
async fn telemetry_before_session_start_is_ignored() {
    let state = test_helpers::test_app_state();
    let (_client, mut rx) = test_helpers::seed_subscriber(&state, "robot_001").await;
    let mut conn = open(&state, "robot_001").await;

    process_agent_text(&state, &mut conn, &telemetry(0.1)).await.unwrap();

    assert_channel_empty(&mut rx).await;
    assert!(state.store.list_failures(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn clean_telemetry_is_stored_and_broadcast() {
    let state = test_helpers::test_app_state();
    let (_client, mut rx) = test_helpers::seed_subscriber(&state, "robot_001").await;
    let mut conn = open(&state, "robot_001").await;
    let session_id = Uuid::new_v4();
    process_agent_text(&state, &mut conn, &session_start(session_id)).await.unwrap();

    process_agent_text(&state, &mut conn, &telemetry(0.92)).await.unwrap();

    let event = assert_channel_has_event(&mut rx).await;
    let DashboardEvent::Telemetry(live) = event else {
        panic!("expected telemetry, got {event:?}");
    };
    assert_eq!(live.robot_id, "robot_001");
    assert_eq!(live.model_confidence, Some(0.92));
    assert_eq!(live.task_phase.as_deref(), Some("grasping"));
    assert_channel_empty(&mut rx).await;

    let points = state.store.session_telemetry(session_id, 100).await.unwrap();
    assert_eq!(points.len(), 1);
}

#[tokio::test]
async fn failing_telemetry_broadcasts_failure_before_telemetry() {
    let state = test_helpers::test_app_state();
    let (_client, mut rx) = test_helpers::seed_subscriber(&state, "robot_001").await;
    let mut conn = open(&state, "robot_001").await;
    let session_id = Uuid::new_v4();
    process_agent_text(&state, &mut conn, &session_start(session_id)).await.unwrap();

    process_agent_text(&state, &mut conn, &telemetry(0.18)).await.unwrap();

    let first = assert_channel_has_event(&mut rx).await;
    let DashboardEvent::Failure { robot_id, failure } = first else {
        panic!("expected failure first, got {first:?}");
    };
    assert_eq!(robot_id, "robot_001");
    assert_eq!(failure.failure_type, FailureType::Model);
    assert_eq!(failure.severity, Severity::Critical);
    assert!(matches!(assert_channel_has_event(&mut rx).await, DashboardEvent::Telemetry(_)));

    let failures = state.store.list_failures(Some("robot_001"), 10).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, failure.id);
    assert_eq!(failures[0].session_id, session_id);
    assert_eq!(failures[0].detected_at, failure.timestamp);
}

#[tokio::test]
async fn heartbeat_updates_fleet_entry() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;
    let heartbeat = json!({
        "type": "heartbeat",
        "timestamp": "2024-05-01T08:00:05Z",
        "data": {"cpu_percent": 20.0, "memory_percent": 55.5, "buffer_size": 7}
    });

    process_agent_text(&state, &mut conn, &heartbeat.to_string()).await.unwrap();

    let robots = fleet::list(&state).await;
    assert_eq!(robots[0].heartbeat.as_ref().map(|h| h.buffer_size), Some(7));
}

#[tokio::test]
async fn agent_error_and_unknown_events_are_accepted() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;
    let error = json!({"type": "error", "data": {"error_type": "collector", "error_msg": "encoder timeout"}});

    process_agent_text(&state, &mut conn, &error.to_string()).await.unwrap();
    process_agent_text(&state, &mut conn, r#"{"type":"firmware_update"}"#).await.unwrap();
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;

    let result = process_agent_text(&state, &mut conn, "{not json").await;
    assert!(matches!(result, Err(IngestError::Decode(_))));
}

#[tokio::test]
async fn finish_ends_session_and_unregisters() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;
    let session_id = Uuid::new_v4();
    process_agent_text(&state, &mut conn, &session_start(session_id)).await.unwrap();

    finish(&state, conn).await;

    let sessions = state.store.list_sessions(None, 10).await.unwrap();
    assert!(sessions[0].ended_at.is_some());
    assert!(fleet::list(&state).await.is_empty());
}

#[tokio::test]
async fn new_session_id_on_same_socket_ends_previous() {
    let state = test_helpers::test_app_state();
    let mut conn = open(&state, "robot_001").await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    process_agent_text(&state, &mut conn, &session_start(first)).await.unwrap();
    process_agent_text(&state, &mut conn, &session_start(second)).await.unwrap();

    let sessions = state.store.list_sessions(None, 10).await.unwrap();
    let ended = sessions.iter().find(|s| s.id == first).unwrap();
    let active = sessions.iter().find(|s| s.id == second).unwrap();
    assert!(ended.ended_at.is_some());
    assert!(active.ended_at.is_none());
}

#[tokio::test]
async fn stale_socket_close_keeps_resumed_session_open() {
    let state = test_helpers::test_app_state();
    let session_id = Uuid::new_v4();
    let mut stale = open(&state, "robot_001").await;
    process_agent_text(&state, &mut stale, &session_start(session_id)).await.unwrap();
    let mut fresh = open(&state, "robot_001").await;
    process_agent_text(&state, &mut fresh, &session_start(session_id)).await.unwrap();

    finish(&state, stale).await;

    let sessions = state.store.list_sessions(Some("robot_001"), 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].ended_at.is_none());
    let robots = fleet::list(&state).await;
    assert_eq!(robots.len(), 1);
    assert_eq!(robots[0].session_id, Some(session_id));

    finish(&state, fresh).await;
    let sessions = state.store.list_sessions(Some("robot_001"), 10).await.unwrap();
    assert!(sessions[0].ended_at.is_some());
}

#[tokio::test]
async fn stale_socket_close_ends_its_own_abandoned_session() {
    let state = test_helpers::test_app_state();
    let abandoned = Uuid::new_v4();
    let mut stale = open(&state, "robot_001").await;
    process_agent_text(&state, &mut stale, &session_start(abandoned)).await.unwrap();
    let mut fresh = open(&state, "robot_001").await;
    process_agent_text(&state, &mut fresh, &session_start(Uuid::new_v4())).await.unwrap();

    finish(&state, stale).await;

    let sessions = state.store.list_sessions(Some("robot_001"), 10).await.unwrap();
    let ended = sessions.iter().find(|s| s.id == abandoned).unwrap();
    assert!(ended.ended_at.is_some());
    assert_eq!(fleet::list(&state).await.len(), 1);
}
