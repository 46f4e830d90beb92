//! Tunable thresholds for the synchronization engine and replay window.
//!
//! Every field is optional in the JSON form and falls back to its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::time::Seconds;
use crate::core::track::TrackRole;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drift above which a track is flagged desynchronized (seconds)
    pub sync_threshold: Seconds,
    /// Drift above which an ahead track is seeked instead of paused (seconds)
    pub jump_threshold: Seconds,
    /// Time the reference may stand still while playing before it is a stall
    pub stall_threshold_ms: u64,
    /// Tick period of the threaded driver (seconds)
    pub frame_interval: Seconds,
    /// Track asked to play first on `play()`
    pub primary: TrackRole,
    /// Messages kept in the trailing chat window
    pub chat_window_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_threshold: 1.0 / 15.0,
            jump_threshold: 1.0,
            stall_threshold_ms: 1000,
            frame_interval: 1.0 / 60.0,
            primary: TrackRole::Video,
            chat_window_size: 50,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sync_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sync_threshold must be positive, got {}",
                self.sync_threshold
            )));
        }
        if !(self.jump_threshold >= self.sync_threshold) {
            return Err(ConfigError::Invalid(format!(
                "jump_threshold ({}) must not be below sync_threshold ({})",
                self.jump_threshold, self.sync_threshold
            )));
        }
        if !(self.frame_interval > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame_interval must be positive, got {}",
                self.frame_interval
            )));
        }
        if self.chat_window_size == 0 {
            return Err(ConfigError::Invalid("chat_window_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_interval)
    }
}
