//! Session replay cursor.
//!
//! The cursor never moves past the last point: reaching it while playing
//! pauses, and pressing play there starts over from the first point.

use std::time::Duration;

use events::TelemetryPoint;

/// Time between steps while playing.
pub const DEFAULT_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct Replay {
    points: Vec<TelemetryPoint>,
    index: usize,
    playing: bool,
}

impl Replay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loaded session; the cursor goes to the start, paused.
    pub fn load(&mut self, points: Vec<TelemetryPoint>) {
        self.points = points;
        self.index = 0;
        self.playing = false;
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.playing = false;
            return;
        }
        if self.points.is_empty() {
            return;
        }
        if self.at_end() {
            self.index = 0;
        }
        self.playing = true;
    }

    /// Jump to `index` (clamped to the last point) and pause.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.points.len().saturating_sub(1));
        self.playing = false;
    }

    /// Advance one point while playing. Returns `true` if the cursor moved.
    pub fn tick(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        if self.at_end() {
            self.playing = false;
            return false;
        }
        self.index += 1;
        if self.at_end() {
            self.playing = false;
        }
        true
    }

    #[must_use]
    pub fn current(&self) -> Option<&TelemetryPoint> {
        self.points.get(self.index)
    }

    /// One-based position and total, e.g. `(12, 340)`. `(0, 0)` when empty.
    #[must_use]
    pub fn position(&self) -> (usize, usize) {
        if self.points.is_empty() {
            (0, 0)
        } else {
            (self.index + 1, self.points.len())
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn at_end(&self) -> bool {
        self.index + 1 >= self.points.len()
    }
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
