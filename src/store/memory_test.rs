use super::*;
use events::{FailureType, ModelState, Severity};
use serde_json::json;
use time::Duration;
use time::macros::datetime;

fn confidence_sample(confidence: f64) -> TelemetryData {
    TelemetryData {
        model: Some(ModelState { action_confidence: Some(confidence), ..ModelState::default() }),
        ..TelemetryData::default()
    }
}

fn new_failure(session_id: Uuid, robot_id: &str, summary: &str) -> NewFailure {
    NewFailure {
        session_id,
        robot_id: robot_id.into(),
        detected_at: OffsetDateTime::now_utc(),
        failure_type: FailureType::Model,
        severity: Severity::Medium,
        confidence: 0.8,
        summary: summary.into(),
        detail: String::new(),
        affected_components: json!({}),
        classifier_data: json!({}),
    }
}

#[tokio::test]
async fn telemetry_is_capped_to_newest_points_per_session() {
    let store = MemoryStore::new(3, 100);
    let session_id = Uuid::new_v4();
    store
        .create_session(session_id, "robot_001", Map::new())
        .await
        .unwrap();

    let start = datetime!(2024-05-01 00:00:00 UTC);
    for i in 0..5_i32 {
        store
            .insert_telemetry(session_id, "robot_001", start + Duration::seconds(i64::from(i)), &confidence_sample(f64::from(i) / 10.0))
            .await
            .unwrap();
    }

    let points = store.session_telemetry(session_id, 100).await.unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].time, start + Duration::seconds(2));
    assert_eq!(points[2].time, start + Duration::seconds(4));
}

#[tokio::test]
async fn session_telemetry_limit_takes_oldest_first() {
    let store = MemoryStore::new(100, 100);
    let session_id = Uuid::new_v4();
    let start = datetime!(2024-05-01 00:00:00 UTC);
    for i in 0..4 {
        store
            .insert_telemetry(session_id, "robot_001", start + Duration::seconds(i), &TelemetryData::default())
            .await
            .unwrap();
    }

    let points = store.session_telemetry(session_id, 2).await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].time, start);
}

#[tokio::test]
async fn unknown_session_telemetry_is_empty() {
    let store = MemoryStore::new(100, 100);
    let points = store.session_telemetry(Uuid::new_v4(), 10).await.unwrap();
    assert!(points.is_empty());
}

#[tokio::test]
async fn failures_are_newest_first_and_capped() {
    let store = MemoryStore::new(100, 2);
    let session_id = Uuid::new_v4();

    for summary in ["first", "second", "third"] {
        store
            .insert_failure(new_failure(session_id, "robot_001", summary))
            .await
            .unwrap();
    }

    let failures = store.list_failures(None, 100).await.unwrap();
    let summaries = failures.iter().map(|f| f.summary.as_str()).collect::<Vec<_>>();
    assert_eq!(summaries, vec!["third", "second"]);
}

#[tokio::test]
async fn late_failure_lists_by_detection_time() {
    let store = MemoryStore::new(100, 100);
    let session_id = Uuid::new_v4();
    let mut newer = new_failure(session_id, "robot_001", "newer");
    newer.detected_at = datetime!(2024-05-01 10:00:00 UTC);
    let mut older = new_failure(session_id, "robot_001", "older");
    older.detected_at = datetime!(2024-05-01 05:00:00 UTC);
    store.insert_failure(newer).await.unwrap();
    store.insert_failure(older).await.unwrap();

    let failures = store.list_failures(None, 100).await.unwrap();
    let summaries = failures.iter().map(|f| f.summary.as_str()).collect::<Vec<_>>();
    assert_eq!(summaries, vec!["newer", "older"]);
}

#[tokio::test]
async fn failure_cap_evicts_oldest_detection() {
    let store = MemoryStore::new(100, 2);
    let session_id = Uuid::new_v4();
    for (summary, hour) in [("noon", 12), ("dawn", 6), ("evening", 18)] {
        let mut failure = new_failure(session_id, "robot_001", summary);
        failure.detected_at = datetime!(2024-05-01 00:00:00 UTC) + Duration::hours(hour);
        store.insert_failure(failure).await.unwrap();
    }

    let failures = store.list_failures(None, 100).await.unwrap();
    let summaries = failures.iter().map(|f| f.summary.as_str()).collect::<Vec<_>>();
    assert_eq!(summaries, vec!["evening", "noon"]);
}

#[tokio::test]
async fn late_telemetry_is_replayed_in_time_order() {
    let store = MemoryStore::new(3, 100);
    let session_id = Uuid::new_v4();
    let start = datetime!(2024-05-01 00:00:00 UTC);
    for offset in [2, 0, 3, 1] {
        store
            .insert_telemetry(session_id, "robot_001", start + Duration::seconds(offset), &TelemetryData::default())
            .await
            .unwrap();
    }

    let times = store
        .session_telemetry(session_id, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.time)
        .collect::<Vec<_>>();
    assert_eq!(times, vec![start + Duration::seconds(1), start + Duration::seconds(2), start + Duration::seconds(3)]);
}

#[tokio::test]
async fn failures_filter_by_robot_and_limit() {
    let store = MemoryStore::new(100, 100);
    let session_id = Uuid::new_v4();
    store.insert_failure(new_failure(session_id, "robot_a", "a1")).await.unwrap();
    store.insert_failure(new_failure(session_id, "robot_b", "b1")).await.unwrap();
    store.insert_failure(new_failure(session_id, "robot_a", "a2")).await.unwrap();

    let only_a = store.list_failures(Some("robot_a"), 100).await.unwrap();
    assert_eq!(only_a.len(), 2);
    assert!(only_a.iter().all(|f| f.robot_id == "robot_a"));

    let limited = store.list_failures(None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].summary, "a2");
}

#[tokio::test]
async fn sessions_list_newest_first_with_failure_counts() {
    let store = MemoryStore::new(100, 1);
    let older = Uuid::new_v4();
    let newer = Uuid::new_v4();
    store.create_session(older, "robot_001", Map::new()).await.unwrap();
    store.create_session(newer, "robot_001", Map::new()).await.unwrap();
    store.create_session(Uuid::new_v4(), "robot_002", Map::new()).await.unwrap();

    // Failure list cap is 1, but counts must still reflect both failures.
    store.insert_failure(new_failure(older, "robot_001", "x")).await.unwrap();
    store.insert_failure(new_failure(older, "robot_001", "y")).await.unwrap();

    let sessions = store.list_sessions(Some("robot_001"), 50).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, newer);
    assert_eq!(sessions[0].failure_count, 0);
    assert_eq!(sessions[1].id, older);
    assert_eq!(sessions[1].failure_count, 2);

    let limited = store.list_sessions(None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn end_then_resume_session_clears_ended_at() {
    let store = MemoryStore::new(100, 100);
    let session_id = Uuid::new_v4();
    let created = store
        .create_session(session_id, "robot_001", Map::new())
        .await
        .unwrap();

    store.end_session(session_id).await.unwrap();
    let ended = store.list_sessions(None, 10).await.unwrap();
    assert!(ended[0].ended_at.is_some());

    let mut metadata = Map::new();
    metadata.insert("hostname".into(), json!("arm-2"));
    let resumed = store
        .create_session(session_id, "robot_001", metadata)
        .await
        .unwrap();
    assert!(resumed.ended_at.is_none());
    assert_eq!(resumed.started_at, created.started_at);
    assert_eq!(resumed.metadata.get("hostname"), Some(&json!("arm-2")));
    assert_eq!(store.list_sessions(None, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn end_unknown_session_is_noop() {
    let store = MemoryStore::new(100, 100);
    store.end_session(Uuid::new_v4()).await.unwrap();
    assert!(store.list_sessions(None, 10).await.unwrap().is_empty());
}
