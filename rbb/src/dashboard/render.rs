//! Plain-text lines for the terminal dashboard.

use events::{DashboardEvent, FailureAlert, LiveTelemetry, RobotStatus, SessionSummary, TelemetryPoint};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::{ConnectionState, Replay};

/// Confidence below this is flagged.
pub const LOW_CONFIDENCE: f64 = 0.5;

const CLOCK: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const STAMP: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn clock(at: OffsetDateTime) -> String {
    at.format(CLOCK).unwrap_or_else(|_| at.to_string())
}

fn stamp(at: OffsetDateTime) -> String {
    at.format(STAMP).unwrap_or_else(|_| at.to_string())
}

fn confidence(value: Option<f64>) -> String {
    match value {
        Some(c) if c < LOW_CONFIDENCE => format!("{:5.1}% !", c * 100.0),
        Some(c) => format!("{:5.1}%  ", c * 100.0),
        None => "    -    ".to_owned(),
    }
}

fn battery(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |b| format!("{b:.0}%"))
}

#[must_use]
pub fn telemetry_line(sample: &LiveTelemetry) -> String {
    format!(
        "{}  {}  conf {}  batt {:>4}  phase {}",
        clock(sample.timestamp),
        sample.robot_id,
        confidence(sample.model_confidence),
        battery(sample.battery_percent),
        sample.task_phase.as_deref().unwrap_or("-"),
    )
}

#[must_use]
pub fn failure_line(robot_id: &str, failure: &FailureAlert) -> String {
    format!(
        "[{}] {}  {}  {}: {}",
        failure.severity.as_str().to_uppercase(),
        clock(failure.timestamp),
        robot_id,
        failure.failure_type,
        failure.summary,
    )
}

/// Line for a live dashboard event; `None` for events not worth showing.
#[must_use]
pub fn event_line(event: &DashboardEvent) -> Option<String> {
    match event {
        DashboardEvent::Telemetry(sample) => Some(telemetry_line(sample)),
        DashboardEvent::Failure { robot_id, failure } => Some(failure_line(robot_id, failure)),
        DashboardEvent::Subscribed { robot_id } => Some(format!("subscribed to {robot_id}")),
        DashboardEvent::Error { message } => Some(format!("server error: {message}")),
        DashboardEvent::Unsubscribed { .. } => None,
    }
}

#[must_use]
pub fn session_line(session: &SessionSummary) -> String {
    let ended = session.ended_at.map_or_else(|| "active".to_owned(), stamp);
    format!(
        "{}  {}  {} -> {}  failures {}",
        session.id,
        session.robot_id,
        stamp(session.started_at),
        ended,
        session.failure_count,
    )
}

#[must_use]
pub fn robot_line(robot: &RobotStatus) -> String {
    let session = robot.session_id.map_or_else(|| "-".to_owned(), |id| id.to_string());
    let (cpu, buffered) = robot.heartbeat.as_ref().map_or((None, 0), |h| (h.cpu_percent, h.buffer_size));
    format!(
        "{}  session {}  last seen {}  cpu {}  buffered {}",
        robot.robot_id,
        session,
        clock(robot.last_seen),
        cpu.map_or_else(|| "-".to_owned(), |c| format!("{c:.0}%")),
        buffered,
    )
}

#[must_use]
pub fn point_line(point: &TelemetryPoint) -> String {
    format!(
        "{}  conf {}  batt {:>4}  phase {}",
        clock(point.time),
        confidence(point.model_confidence),
        battery(point.battery_percent),
        point.task_phase.as_deref().unwrap_or("-"),
    )
}

/// `[12/340] <point>`, or a placeholder when nothing is loaded.
#[must_use]
pub fn replay_line(replay: &Replay) -> String {
    let (position, total) = replay.position();
    match replay.current() {
        Some(point) => format!("[{position}/{total}] {}", point_line(point)),
        None => "no telemetry recorded for this session".to_owned(),
    }
}

#[must_use]
pub fn status_line(state: ConnectionState, robot_id: &str) -> String {
    match state {
        ConnectionState::Connected => format!("* live: watching {robot_id}"),
        ConnectionState::Disconnected => "o disconnected: retrying".to_owned(),
    }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
