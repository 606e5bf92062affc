use super::*;
use events::{ModelState, SystemState, TaskState};
use time::macros::datetime;

#[test]
fn telemetry_point_projects_replay_columns() {
    let data = TelemetryData {
        model: Some(ModelState { action_confidence: Some(0.42), ..ModelState::default() }),
        task: Some(TaskState { phase: Some("placing".into()), ..TaskState::default() }),
        system: Some(SystemState { battery_percent: Some(71.5), ..SystemState::default() }),
        ..TelemetryData::default()
    };
    let at = datetime!(2024-05-01 08:00:00 UTC);

    let point = telemetry_point(at, &data);
    assert_eq!(point.time, at);
    assert_eq!(point.model_confidence, Some(0.42));
    assert_eq!(point.task_phase.as_deref(), Some("placing"));
    assert_eq!(point.battery_percent, Some(71.5));
}

#[test]
fn telemetry_point_tolerates_empty_payload() {
    let point = telemetry_point(datetime!(2024-05-01 08:00:00 UTC), &TelemetryData::default());
    assert!(point.model_confidence.is_none());
    assert!(point.task_phase.is_none());
    assert!(point.battery_percent.is_none());
}

#[test]
fn new_failure_into_record_keeps_fields() {
    let session_id = Uuid::new_v4();
    let id = Uuid::new_v4();
    let failure = NewFailure {
        session_id,
        robot_id: "robot_001".into(),
        detected_at: datetime!(2024-05-01 08:00:00 UTC),
        failure_type: FailureType::Sensor,
        severity: Severity::High,
        confidence: 0.95,
        summary: "Sensor dropout on joint(s) [2]".into(),
        detail: String::new(),
        affected_components: serde_json::json!({"joints": [2]}),
        classifier_data: serde_json::json!({}),
    };

    let record = failure.into_record(id);
    assert_eq!(record.id, id);
    assert_eq!(record.session_id, session_id);
    assert_eq!(record.failure_type, FailureType::Sensor);
    assert_eq!(record.affected_components["joints"][0], 2);
}
