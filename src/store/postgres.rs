//! Postgres-backed store.
//!
//! Every telemetry sample is written in full (`raw_data`) alongside the flat
//! columns replay and analytics queries read.

use events::{FailureRecord, FailureType, SessionSummary, Severity, TelemetryData, TelemetryPoint};
use serde_json::{Map, Value};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewFailure, Store, StoreError};

type SessionRow = (Uuid, String, OffsetDateTime, Option<OffsetDateTime>, Value, i64);

type FailureRow = (Uuid, Uuid, String, OffsetDateTime, String, String, f64, String, String, Value, Value);

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn session_from_row(row: SessionRow) -> SessionSummary {
    let (id, robot_id, started_at, ended_at, metadata, failure_count) = row;
    SessionSummary {
        id,
        robot_id,
        started_at,
        ended_at,
        metadata: into_map(metadata),
        failure_count: u64::try_from(failure_count).unwrap_or(0),
    }
}

fn failure_from_row(row: FailureRow) -> Result<FailureRecord, StoreError> {
    let (
        id,
        session_id,
        robot_id,
        detected_at,
        failure_type,
        severity,
        confidence,
        summary,
        detail,
        affected_components,
        classifier_data,
    ) = row;
    let failure_type = FailureType::parse(&failure_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown failure_type `{failure_type}` on {id}")))?;
    let severity =
        Severity::parse(&severity).ok_or_else(|| StoreError::Corrupt(format!("unknown severity `{severity}` on {id}")))?;

    Ok(FailureRecord {
        id,
        session_id,
        robot_id,
        detected_at,
        failure_type,
        severity,
        confidence,
        summary,
        detail,
        affected_components,
        classifier_data,
    })
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn create_session(
        &self,
        session_id: Uuid,
        robot_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionSummary, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "WITH upserted AS (
                 INSERT INTO sessions (id, robot_id, started_at, metadata)
                 VALUES ($1, $2, now(), $3)
                 ON CONFLICT (id) DO UPDATE SET ended_at = NULL, metadata = EXCLUDED.metadata
                 RETURNING id, robot_id, started_at, ended_at, metadata
             )
             SELECT u.id, u.robot_id, u.started_at, u.ended_at, u.metadata,
                    (SELECT COUNT(*) FROM failures f WHERE f.session_id = u.id) AS failure_count
             FROM upserted u",
        )
        .bind(session_id)
        .bind(robot_id)
        .bind(Value::Object(metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(session_from_row(row))
    }

    async fn end_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET ended_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_sessions(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT s.id, s.robot_id, s.started_at, s.ended_at, s.metadata, COUNT(f.id) AS failure_count
             FROM sessions s
             LEFT JOIN failures f ON f.session_id = s.id
             WHERE $1::TEXT IS NULL OR s.robot_id = $1
             GROUP BY s.id
             ORDER BY s.started_at DESC
             LIMIT $2",
        )
        .bind(robot_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(session_from_row).collect())
    }

    async fn insert_telemetry(
        &self,
        session_id: Uuid,
        robot_id: &str,
        time: OffsetDateTime,
        data: &TelemetryData,
    ) -> Result<(), StoreError> {
        let gripper = data.gripper.clone().unwrap_or_default();
        let task = data.task.clone().unwrap_or_default();
        let model = data.model.clone().unwrap_or_default();
        let system = data.system.clone().unwrap_or_default();
        let raw = serde_json::to_value(data)?;

        sqlx::query(
            "INSERT INTO telemetry (
                 time, session_id, robot_id,
                 gripper_position, gripper_force, gripper_contact,
                 task_name, task_phase, task_progress,
                 model_confidence, model_uncertainty, model_inference_ms, model_action,
                 cpu_percent, memory_mb, battery_percent, raw_data
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(time)
        .bind(session_id)
        .bind(robot_id)
        .bind(gripper.position_mm)
        .bind(gripper.force_n)
        .bind(gripper.contact_detected)
        .bind(task.current_task)
        .bind(task.phase)
        .bind(task.phase_progress)
        .bind(model.action_confidence)
        .bind(model.uncertainty)
        .bind(model.inference_time_ms)
        .bind(model.predicted_action)
        .bind(system.cpu_percent)
        .bind(system.memory_mb)
        .bind(system.battery_percent)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_telemetry(&self, session_id: Uuid, limit: usize) -> Result<Vec<TelemetryPoint>, StoreError> {
        let rows = sqlx::query_as::<_, (OffsetDateTime, Option<f64>, Option<String>, Option<f64>)>(
            "SELECT time, model_confidence, task_phase, battery_percent
             FROM telemetry
             WHERE session_id = $1
             ORDER BY time ASC
             LIMIT $2",
        )
        .bind(session_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(time, model_confidence, task_phase, battery_percent)| TelemetryPoint {
                time,
                model_confidence,
                task_phase,
                battery_percent,
            })
            .collect())
    }

    async fn insert_failure(&self, failure: NewFailure) -> Result<FailureRecord, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO failures (
                 id, session_id, robot_id, detected_at, failure_type, severity,
                 confidence, summary, detail, affected_components, classifier_data
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(id)
        .bind(failure.session_id)
        .bind(&failure.robot_id)
        .bind(failure.detected_at)
        .bind(failure.failure_type.as_str())
        .bind(failure.severity.as_str())
        .bind(failure.confidence)
        .bind(&failure.summary)
        .bind(&failure.detail)
        .bind(&failure.affected_components)
        .bind(&failure.classifier_data)
        .execute(&self.pool)
        .await?;

        Ok(failure.into_record(id))
    }

    async fn list_failures(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<FailureRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FailureRow>(
            "SELECT id, session_id, robot_id, detected_at, failure_type, severity,
                    confidence, summary, detail, affected_components, classifier_data
             FROM failures
             WHERE $1::TEXT IS NULL OR robot_id = $1
             ORDER BY detected_at DESC
             LIMIT $2",
        )
        .bind(robot_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(failure_from_row).collect()
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
