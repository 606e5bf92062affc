//! Simulated 6-DOF pick-and-place arm.
//!
//! Joints follow slow sine waves, the task cycles through five phases every
//! 30 ticks, and the battery drains 0.01% per tick. Every 50-200 ticks one
//! failure is injected and held for 5-20 ticks so the server's classifier
//! has something to find:
//!
//! - `SensorDropout`: one joint's position and velocity go null.
//! - `MotorOverload`: one joint's torque jumps well past the overload limit.
//! - `ModelLowConfidence`: action confidence falls to 0.15-0.40.

use std::f64::consts::FRAC_PI_4;

use events::{GripperState, JointState, ModelState, SystemState, TaskState, TelemetryData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use super::{Collector, CollectorError};

const JOINTS: usize = 6;
const PHASES: [&str; 5] = ["reaching", "grasping", "lifting", "placing", "returning"];
const TICKS_PER_PHASE: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    SensorDropout,
    MotorOverload,
    ModelLowConfidence,
}

#[derive(Debug)]
pub struct MockCollector {
    rng: StdRng,
    tick: u64,
    active: Option<InjectedFailure>,
    /// Ticks until the next injection while healthy.
    countdown: u32,
    /// Ticks left on the active injection.
    remaining: u32,
}

impl Default for MockCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic collector for tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let countdown = rng.random_range(50..=200);
        Self { rng, tick: 0, active: None, countdown, remaining: 0 }
    }

    #[cfg(test)]
    pub fn active_failure(&self) -> Option<InjectedFailure> {
        self.active
    }

    fn advance_failure(&mut self) {
        if self.active.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.active = None;
                self.countdown = self.rng.random_range(50..=200);
            }
            return;
        }

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.active = Some(match self.rng.random_range(0..3) {
                0 => InjectedFailure::SensorDropout,
                1 => InjectedFailure::MotorOverload,
                _ => InjectedFailure::ModelLowConfidence,
            });
            self.remaining = self.rng.random_range(5..=20);
            debug!(failure = ?self.active, ticks = self.remaining, "injecting failure");
        }
    }

    /// Normal sample; a degenerate `std_dev` yields `mean`.
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        Normal::new(mean, std_dev).map_or(mean, |normal| normal.sample(&mut self.rng))
    }

    #[allow(clippy::cast_precision_loss)]
    fn joints(&mut self) -> JointState {
        let t = self.tick as f64;
        let mut positions = Vec::with_capacity(JOINTS);
        let mut velocities = Vec::with_capacity(JOINTS);
        let mut torques = Vec::with_capacity(JOINTS);
        for i in 0..JOINTS {
            let freq = 0.01 * (i + 1) as f64;
            let velocity = (t * freq).cos() * freq * FRAC_PI_4;
            positions.push(Some((t * freq).sin() * FRAC_PI_4));
            velocities.push(Some(velocity));
            torques.push(Some(velocity.abs() * 10.0 + self.gauss(0.0, 0.5)));
        }

        match self.active {
            Some(InjectedFailure::SensorDropout) => {
                let idx = self.rng.random_range(0..JOINTS);
                positions[idx] = None;
                velocities[idx] = None;
            }
            Some(InjectedFailure::MotorOverload) => {
                let idx = self.rng.random_range(0..JOINTS);
                let spike = self.rng.random_range(50.0..100.0);
                torques[idx] = torques[idx].map(|torque| torque * 8.0 + spike);
            }
            _ => {}
        }

        let temperatures = (0..JOINTS).map(|_| Some(self.gauss(35.0, 2.0))).collect();
        JointState {
            names: Vec::new(),
            positions_rad: positions,
            velocities_rad_s: velocities,
            torques_nm: torques,
            temperatures_c: temperatures,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn gripper(&mut self) -> GripperState {
        GripperState {
            position_mm: Some(50.0 + (self.tick as f64 * 0.02).sin() * 30.0),
            force_n: Some(self.gauss(5.0, 1.0).abs()),
            contact_detected: Some(self.rng.random_bool(0.3)),
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn task(&self) -> TaskState {
        let phase = PHASES[((self.tick / TICKS_PER_PHASE) % PHASES.len() as u64) as usize];
        TaskState {
            current_task: Some("pick_and_place".to_owned()),
            phase: Some(phase.to_owned()),
            phase_progress: Some((self.tick % TICKS_PER_PHASE) as f64 / TICKS_PER_PHASE as f64),
        }
    }

    fn model(&mut self) -> ModelState {
        let confidence = if self.active == Some(InjectedFailure::ModelLowConfidence) {
            self.rng.random_range(0.15..0.40)
        } else {
            self.rng.random_range(0.75..0.99)
        };
        ModelState {
            action_confidence: Some(confidence),
            inference_time_ms: Some(self.rng.random_range(80.0..120.0)),
            predicted_action: Some("move_to_target".to_owned()),
            uncertainty: Some(1.0 - confidence),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn system(&mut self) -> SystemState {
        SystemState {
            timestamp_robot: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
            cpu_percent: Some(self.rng.random_range(45.0..75.0)),
            memory_mb: Some(self.rng.random_range(800.0..1200.0)),
            battery_percent: Some((100.0 - self.tick as f64 * 0.01).max(0.0)),
        }
    }
}

impl Collector for MockCollector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn snapshot(&mut self) -> Result<TelemetryData, CollectorError> {
        self.tick += 1;
        self.advance_failure();

        Ok(TelemetryData {
            joints: Some(self.joints()),
            gripper: Some(self.gripper()),
            task: Some(self.task()),
            model: Some(self.model()),
            system: Some(self.system()),
        })
    }
}

#[cfg(test)]
#[path = "mock_test.rs"]
mod tests;
