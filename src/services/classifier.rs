//! Rule-based failure classifier.
//!
//! DESIGN
//! ======
//! Each telemetry sample is checked against an ordered rule list and the first
//! match wins:
//! 1. sensor dropout (null joint position)
//! 2. motor overload (torque above 50 Nm)
//! 3. model uncertainty (confidence below 0.25 critical, below 0.45 medium)
//! 4. low battery (below 15%)
//! 5. joint overheating (above 60 C)
//! 6. confidence anomaly (more than 3 sigma from the robot's rolling mean)
//!
//! Per-robot state is small: a rolling confidence window and a count of
//! consecutive failing samples. A clean sample resets the count.

use std::collections::{HashMap, VecDeque};

use events::{FailureType, Severity, TelemetryData};
use serde_json::{Value, json};

pub const TORQUE_OVERLOAD_NM: f64 = 50.0;
pub const CONFIDENCE_CRITICAL: f64 = 0.25;
pub const CONFIDENCE_LOW: f64 = 0.45;
pub const BATTERY_LOW_PERCENT: f64 = 15.0;
pub const TEMPERATURE_WARNING_C: f64 = 60.0;

const CONFIDENCE_WINDOW: usize = 100;
const ANOMALY_MIN_SAMPLES: usize = 20;
const ANOMALY_SIGMA: f64 = 3.0;

// =============================================================================
// ROLLING STATS
// =============================================================================

/// Fixed-size window with population mean and standard deviation.
#[derive(Debug, Clone)]
pub struct RollingStats {
    values: VecDeque<f64>,
    window: usize,
}

impl RollingStats {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self { values: VecDeque::with_capacity(window), window: window.max(1) }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.window {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Population standard deviation; `None` below two samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std_dev(&self) -> Option<f64> {
        if self.values.len() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.values.len() as f64;
        Some(variance.sqrt())
    }

    /// True when `value` sits more than `sigma` deviations from the mean.
    #[must_use]
    pub fn is_anomaly(&self, value: f64, sigma: f64) -> bool {
        match (self.mean(), self.std_dev()) {
            (Some(mean), Some(std)) if std > 0.0 => (value - mean).abs() > sigma * std,
            _ => false,
        }
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// A detected failure, before it is tied to a session and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub failure_type: FailureType,
    pub severity: Severity,
    pub confidence: f64,
    pub summary: String,
    pub detail: String,
    pub affected_components: Value,
    pub classifier_data: Value,
}

impl Classification {
    fn new(failure_type: FailureType, severity: Severity, confidence: f64, summary: String, detail: String) -> Self {
        Self {
            failure_type,
            severity,
            confidence,
            summary,
            detail,
            affected_components: json!({}),
            classifier_data: json!({}),
        }
    }

    fn affecting(mut self, affected: Value) -> Self {
        self.affected_components = affected;
        self
    }

    fn with_data(mut self, data: Value) -> Self {
        self.classifier_data = data;
        self
    }
}

#[derive(Debug)]
struct RobotStats {
    confidence: RollingStats,
    consecutive: u32,
}

impl Default for RobotStats {
    fn default() -> Self {
        Self { confidence: RollingStats::new(CONFIDENCE_WINDOW), consecutive: 0 }
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

#[derive(Debug, Default)]
pub struct FailureClassifier {
    robots: HashMap<String, RobotStats>,
}

impl FailureClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one sample for `robot_id`, updating that robot's state.
    pub fn classify(&mut self, robot_id: &str, data: &TelemetryData) -> Option<Classification> {
        let stats = self.robots.entry(robot_id.to_owned()).or_default();
        let confidence = data.model_confidence();

        let found = check_rules(data).or_else(|| confidence.and_then(|c| check_anomaly(&stats.confidence, c)));
        if let Some(c) = confidence {
            stats.confidence.push(c);
        }

        match found {
            Some(mut classification) => {
                stats.consecutive += 1;
                if let Value::Object(map) = &mut classification.classifier_data {
                    map.insert("consecutive".into(), json!(stats.consecutive));
                }
                Some(classification)
            }
            None => {
                stats.consecutive = 0;
                None
            }
        }
    }

    /// Drop a robot's rolling state.
    pub fn forget(&mut self, robot_id: &str) {
        self.robots.remove(robot_id);
    }
}

fn indices_where(values: &[Option<f64>], predicate: impl Fn(Option<f64>) -> bool) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| predicate(**v))
        .map(|(i, _)| i)
        .collect()
}

fn check_rules(data: &TelemetryData) -> Option<Classification> {
    if let Some(joints) = &data.joints {
        let dropped = indices_where(&joints.positions_rad, |p| p.is_none());
        if !dropped.is_empty() {
            return Some(
                Classification::new(
                    FailureType::Sensor,
                    Severity::High,
                    0.95,
                    format!("Sensor dropout on joint(s) {dropped:?}"),
                    format!("Joint encoder(s) {dropped:?} returned null. Check connections."),
                )
                .affecting(json!({ "joints": dropped }))
                .with_data(json!({ "null_joints": dropped })),
            );
        }

        let overloaded = indices_where(&joints.torques_nm, |t| t.is_some_and(|t| t > TORQUE_OVERLOAD_NM));
        if !overloaded.is_empty() {
            return Some(
                Classification::new(
                    FailureType::Motor,
                    Severity::High,
                    0.90,
                    format!("Motor overload on joint(s) {overloaded:?}"),
                    "Abnormal torque detected. Check for obstructions.".into(),
                )
                .affecting(json!({ "joints": overloaded }))
                .with_data(json!({ "torques": joints.torques_nm })),
            );
        }
    }

    if let Some(confidence) = data.model_confidence() {
        let percent = confidence * 100.0;
        if confidence < CONFIDENCE_CRITICAL {
            return Some(
                Classification::new(
                    FailureType::Model,
                    Severity::Critical,
                    0.88,
                    format!("AI model critically uncertain ({percent:.0}%)"),
                    "Model in unfamiliar situation. Consider stopping robot.".into(),
                )
                .affecting(json!({ "confidence": confidence })),
            );
        }
        if confidence < CONFIDENCE_LOW {
            return Some(
                Classification::new(
                    FailureType::Model,
                    Severity::Medium,
                    0.80,
                    format!("AI model low confidence ({percent:.0}%)"),
                    "Model uncertain. Monitor closely.".into(),
                )
                .affecting(json!({ "confidence": confidence })),
            );
        }
    }

    if let Some(battery) = data.battery_percent()
        && battery < BATTERY_LOW_PERCENT
    {
        return Some(
            Classification::new(
                FailureType::System,
                Severity::Medium,
                1.0,
                format!("Low battery ({battery:.0}%)"),
                "Return to charging station.".into(),
            )
            .affecting(json!({ "battery": battery })),
        );
    }

    if let Some(joints) = &data.joints {
        let hot = indices_where(&joints.temperatures_c, |t| t.is_some_and(|t| t > TEMPERATURE_WARNING_C));
        if !hot.is_empty() {
            return Some(
                Classification::new(
                    FailureType::Thermal,
                    Severity::Medium,
                    0.85,
                    format!("Joint overheating on joint(s) {hot:?}"),
                    "Joint temperature above warning threshold. Reduce duty cycle.".into(),
                )
                .affecting(json!({ "joints": hot }))
                .with_data(json!({ "temperatures": joints.temperatures_c })),
            );
        }
    }

    None
}

fn check_anomaly(history: &RollingStats, confidence: f64) -> Option<Classification> {
    if history.len() < ANOMALY_MIN_SAMPLES || !history.is_anomaly(confidence, ANOMALY_SIGMA) {
        return None;
    }
    let mean = history.mean()?;
    let std = history.std_dev()?;
    Some(
        Classification::new(
            FailureType::Model,
            Severity::Low,
            0.60,
            format!("Confidence anomaly ({:.0}% vs mean {:.0}%)", confidence * 100.0, mean * 100.0),
            "Model confidence deviates sharply from recent behaviour.".into(),
        )
        .affecting(json!({ "confidence": confidence }))
        .with_data(json!({ "mean": mean, "std": std })),
    )
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod tests;
