//! Agent configuration.
//!
//! Values come from three layers, later ones winning:
//! built-in defaults, an optional JSON file (`rbb config --init` writes
//! `~/.robotblackbox/config.json`), then command-line flags, which clap also
//! reads from `RBB_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_ROBOT_ID: &str = "robot_001";
const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";
const DEFAULT_COLLECTION_HZ: f64 = 10.0;
const DEFAULT_BUFFER_MAX: usize = 1000;
const MAX_COLLECTION_HZ: f64 = 1000.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0} (expected .json)")]
    UnsupportedFormat(PathBuf),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub robot_id: String,
    /// Server base URL; `ws(s)://` or `http(s)://`.
    pub server_url: String,
    pub collection_hz: f64,
    /// Events held while disconnected; newer events are dropped beyond this.
    pub buffer_max: usize,
    pub use_mock: bool,
    pub share_anonymized_failures: bool,
    pub local_cache_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            robot_id: DEFAULT_ROBOT_ID.to_owned(),
            server_url: DEFAULT_SERVER_URL.to_owned(),
            collection_hz: DEFAULT_COLLECTION_HZ,
            buffer_max: DEFAULT_BUFFER_MAX,
            use_mock: false,
            share_anonymized_failures: true,
            local_cache_dir: default_dir(),
        }
    }
}

/// Command-line values that override the file or defaults when present.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub robot_id: Option<String>,
    pub server_url: Option<String>,
    pub collection_hz: Option<f64>,
    pub buffer_max: Option<usize>,
    pub use_mock: bool,
}

/// `~/.robotblackbox`, or `./.robotblackbox` when no home directory is known.
#[must_use]
pub fn default_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".robotblackbox")
}

#[must_use]
pub fn default_path() -> PathBuf {
    default_dir().join("config.json")
}

impl AgentConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not `.json`, unreadable, malformed,
    /// or fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty JSON, creating parent directories.
    /// Defaults to `<local_cache_dir>/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = path.map_or_else(|| self.local_cache_dir.join("config.json"), Path::to_path_buf);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write { path: parent.to_path_buf(), source })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| ConfigError::Write { path: path.clone(), source })?;
        Ok(path)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(robot_id) = overrides.robot_id {
            self.robot_id = robot_id;
        }
        if let Some(server_url) = overrides.server_url {
            self.server_url = server_url;
        }
        if let Some(hz) = overrides.collection_hz {
            self.collection_hz = hz;
        }
        if let Some(buffer_max) = overrides.buffer_max {
            self.buffer_max = buffer_max;
        }
        if overrides.use_mock {
            self.use_mock = true;
        }
        self
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.robot_id.trim().is_empty() || self.robot_id.contains('/') {
            return Err(ConfigError::Invalid(format!("robot_id `{}` must be non-empty without '/'", self.robot_id)));
        }
        if crate::endpoint::ws_base(&self.server_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "server_url `{}` must start with ws://, wss://, http:// or https://",
                self.server_url
            )));
        }
        if !self.collection_hz.is_finite() || self.collection_hz <= 0.0 || self.collection_hz > MAX_COLLECTION_HZ {
            return Err(ConfigError::Invalid(format!(
                "collection_hz {} must be in (0, {MAX_COLLECTION_HZ}]",
                self.collection_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
