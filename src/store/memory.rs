//! Bounded in-memory store.

use std::collections::{HashMap, VecDeque};

use events::{FailureRecord, SessionSummary, TelemetryData, TelemetryPoint};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{NewFailure, Store, StoreError, telemetry_point};

struct StoredSession {
    summary: SessionSummary,
    /// Creation order, breaks `started_at` ties.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, StoredSession>,
    telemetry: HashMap<Uuid, VecDeque<TelemetryPoint>>,
    /// Newest `detected_at` first.
    failures: VecDeque<FailureRecord>,
    /// Lifetime failure count per session; survives failure-list eviction.
    failure_counts: HashMap<Uuid, u64>,
    next_seq: u64,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    telemetry_per_session: usize,
    failure_cap: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(telemetry_per_session: usize, failure_cap: usize) -> Self {
        info!(telemetry_per_session, failure_cap, "using in-memory store");
        Self { inner: RwLock::new(Inner::default()), telemetry_per_session, failure_cap }
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_session(
        &self,
        session_id: Uuid,
        robot_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<SessionSummary, StoreError> {
        let mut inner = self.inner.write().await;
        let failure_count = inner.failure_counts.get(&session_id).copied().unwrap_or(0);

        if let Some(existing) = inner.sessions.get_mut(&session_id) {
            existing.summary.ended_at = None;
            existing.summary.metadata = metadata;
            let mut summary = existing.summary.clone();
            summary.failure_count = failure_count;
            return Ok(summary);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let summary = SessionSummary {
            id: session_id,
            robot_id: robot_id.to_owned(),
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            metadata,
            failure_count,
        };
        inner.sessions.insert(session_id, StoredSession { summary: summary.clone(), seq });
        Ok(summary)
    }

    async fn end_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.summary.ended_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn list_sessions(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut matching = inner
            .sessions
            .values()
            .filter(|s| robot_id.is_none_or(|rid| s.summary.robot_id == rid))
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| {
            b.summary
                .started_at
                .cmp(&a.summary.started_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|s| {
                let mut summary = s.summary.clone();
                summary.failure_count = inner.failure_counts.get(&summary.id).copied().unwrap_or(0);
                summary
            })
            .collect())
    }

    async fn insert_telemetry(
        &self,
        session_id: Uuid,
        _robot_id: &str,
        time: OffsetDateTime,
        data: &TelemetryData,
    ) -> Result<(), StoreError> {
        if self.telemetry_per_session == 0 {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        let points = inner.telemetry.entry(session_id).or_default();
        // Late samples slot in by time; the cap then evicts the oldest.
        let at = points.iter().rposition(|p| p.time <= time).map_or(0, |i| i + 1);
        points.insert(at, telemetry_point(time, data));
        while points.len() > self.telemetry_per_session {
            points.pop_front();
        }
        Ok(())
    }

    async fn session_telemetry(&self, session_id: Uuid, limit: usize) -> Result<Vec<TelemetryPoint>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .telemetry
            .get(&session_id)
            .map(|points| points.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_failure(&self, failure: NewFailure) -> Result<FailureRecord, StoreError> {
        let record = failure.into_record(Uuid::new_v4());
        let mut inner = self.inner.write().await;
        *inner.failure_counts.entry(record.session_id).or_insert(0) += 1;
        let at = inner
            .failures
            .iter()
            .position(|f| f.detected_at <= record.detected_at)
            .unwrap_or(inner.failures.len());
        inner.failures.insert(at, record.clone());
        inner.failures.truncate(self.failure_cap);
        Ok(record)
    }

    async fn list_failures(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<FailureRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .failures
            .iter()
            .filter(|f| robot_id.is_none_or(|rid| f.robot_id == rid))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
