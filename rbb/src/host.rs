//! Host identity and load figures for `session_start` metadata and heartbeats.
//!
//! Readings come from `sysinfo`. On platforms it cannot read, the sampler
//! returns `None` and the agent reports nulls.

use sysinfo::System;

/// Machine hostname, or `"unknown"`.
#[must_use]
pub fn hostname() -> String {
    System::host_name()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Operating system name, e.g. `linux`.
#[must_use]
pub fn platform() -> &'static str {
    std::env::consts::OS
}

/// CPU and memory load, refreshed on each call.
pub struct HostSampler {
    system: System,
    primed: bool,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    #[must_use]
    pub fn new() -> Self {
        Self { system: System::new(), primed: false }
    }

    /// Busy percentage across all cores since the previous call; `None` on
    /// the first call.
    pub fn cpu_percent(&mut self) -> Option<f64> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            return None;
        }
        if !std::mem::replace(&mut self.primed, true) {
            return None;
        }
        Some(f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0))
    }

    /// Percentage of memory in use.
    pub fn memory_percent(&mut self) -> Option<f64> {
        self.system.refresh_memory();
        used_percent(self.system.total_memory(), self.system.available_memory())
    }
}

/// `(total - available) / total * 100`.
#[allow(clippy::cast_precision_loss)]
fn used_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}

#[cfg(test)]
#[path = "host_test.rs"]
mod tests;
