//! Persisted player preferences.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

/// Error type for preference storage
#[derive(Debug, thiserror::Error)]
pub enum PrefError {
    #[error("Preference file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Preference encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key/value preference storage
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, serde_json::Value>, PrefError>;
    fn save(&self, values: &HashMap<String, serde_json::Value>) -> Result<(), PrefError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<HashMap<String, serde_json::Value>, PrefError> {
        Ok(self.values.lock().clone())
    }

    fn save(&self, values: &HashMap<String, serde_json::Value>) -> Result<(), PrefError> {
        *self.values.lock() = values.clone();
        Ok(())
    }
}

/// Store backed by one JSON file; a missing file reads as empty
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PrefError {
        PrefError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<HashMap<String, serde_json::Value>, PrefError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, values: &HashMap<String, serde_json::Value>) -> Result<(), PrefError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text).map_err(|e| self.io_error(e))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PreferenceValues {
    chat_visible: bool,
    volume: f32,
    smooth_scroll: bool,
}

impl Default for PreferenceValues {
    fn default() -> Self {
        Self {
            chat_visible: true,
            volume: 1.0,
            smooth_scroll: true,
        }
    }
}

const CHAT_VISIBLE: &str = "chat_visible";
const VOLUME: &str = "volume";
const SMOOTH_SCROLL: &str = "smooth_scroll";

/// Player preferences, read once from a store and written through on change
pub struct PlayerPreferences<S: PreferenceStore> {
    store: S,
    raw: HashMap<String, serde_json::Value>,
    values: PreferenceValues,
}

impl<S: PreferenceStore> PlayerPreferences<S> {
    /// Load from `store`. Unreadable or mistyped entries fall back to
    /// defaults.
    pub fn load(store: S) -> Self {
        let raw = store.load().unwrap_or_else(|e| {
            warn!("Using default preferences: {}", e);
            HashMap::new()
        });

        let defaults = PreferenceValues::default();
        let bool_or = |key: &str, default: bool| {
            raw.get(key).and_then(serde_json::Value::as_bool).unwrap_or(default)
        };
        let values = PreferenceValues {
            chat_visible: bool_or(CHAT_VISIBLE, defaults.chat_visible),
            volume: raw
                .get(VOLUME)
                .and_then(serde_json::Value::as_f64)
                .map(|v| (v as f32).clamp(0.0, 1.0))
                .unwrap_or(defaults.volume),
            smooth_scroll: bool_or(SMOOTH_SCROLL, defaults.smooth_scroll),
        };

        Self { store, raw, values }
    }

    pub fn chat_visible(&self) -> bool {
        self.values.chat_visible
    }

    pub fn volume(&self) -> f32 {
        self.values.volume
    }

    pub fn smooth_scroll(&self) -> bool {
        self.values.smooth_scroll
    }

    pub fn set_chat_visible(&mut self, visible: bool) -> Result<(), PrefError> {
        self.values.chat_visible = visible;
        self.write(CHAT_VISIBLE, serde_json::Value::Bool(visible))
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), PrefError> {
        let volume = volume.clamp(0.0, 1.0);
        self.values.volume = volume;
        self.write(VOLUME, serde_json::json!(volume))
    }

    pub fn set_smooth_scroll(&mut self, smooth: bool) -> Result<(), PrefError> {
        self.values.smooth_scroll = smooth;
        self.write(SMOOTH_SCROLL, serde_json::Value::Bool(smooth))
    }

    /// Unknown keys in the store are preserved
    fn write(&mut self, key: &str, value: serde_json::Value) -> Result<(), PrefError> {
        self.raw.insert(key.to_string(), value);
        self.store.save(&self.raw)
    }
}
