//! Drift detection and correction between the video and audio tracks.
//!
//! Two thresholds are used. Drift beyond `sync` flags a track as
//! desynchronized; while flagged, a track that is behind or ahead by more than
//! `jump` is seeked onto the reference, and a track that is only slightly ahead
//! is paused until the reference catches up with it. The flag is released only
//! when the track sits exactly on the reference, or right after a seek.

use crate::config::SyncConfig;
use crate::core::time::Seconds;

/// Drift thresholds in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncThresholds {
    pub sync: Seconds,
    pub jump: Seconds,
}

impl SyncThresholds {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            sync: config.sync_threshold,
            jump: config.jump_threshold,
        }
    }
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Classification of a track's offset from the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftClass {
    InSync,
    /// Slightly ahead; recoverable by waiting
    Drifting,
    /// Behind, or too far ahead to wait for
    Jumped,
}

/// Classify `delta = track_time - reference`
pub fn classify(delta: Seconds, thresholds: SyncThresholds) -> DriftClass {
    if delta.abs() <= thresholds.sync {
        DriftClass::InSync
    } else if delta > 0.0 && delta <= thresholds.jump {
        DriftClass::Drifting
    } else {
        DriftClass::Jumped
    }
}

/// Action the controller must apply to a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    None,
    /// Hard-seek to the given reference time
    Seek(Seconds),
    /// Hold the track until the reference reaches it
    Pause,
}

/// Per-track synchronization flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub desynced: bool,
}

/// Synchronization controller holding one `SyncState` per track
#[derive(Debug, Clone)]
pub struct SyncController {
    thresholds: SyncThresholds,
    states: Vec<SyncState>,
}

impl SyncController {
    /// Create a controller for `tracks` tracks, all in sync
    pub fn new(thresholds: SyncThresholds, tracks: usize) -> Self {
        Self {
            thresholds,
            states: vec![SyncState::default(); tracks],
        }
    }

    pub fn thresholds(&self) -> SyncThresholds {
        self.thresholds
    }

    pub fn is_desynced(&self, index: usize) -> bool {
        self.states.get(index).is_some_and(|s| s.desynced)
    }

    /// True when no track is flagged
    pub fn all_synced(&self) -> bool {
        self.states.iter().all(|s| !s.desynced)
    }

    pub fn reset(&mut self, index: usize) {
        if let Some(state) = self.states.get_mut(index) {
            *state = SyncState::default();
        }
    }

    pub fn reset_all(&mut self) {
        self.states.iter_mut().for_each(|s| *s = SyncState::default());
    }

    /// Run detection and correction for one track against `reference`
    pub fn evaluate(&mut self, index: usize, track_time: Seconds, reference: Seconds) -> Correction {
        let thresholds = self.thresholds;
        let Some(state) = self.states.get_mut(index) else {
            return Correction::None;
        };

        let delta = track_time - reference;
        if delta.abs() > thresholds.sync {
            state.desynced = true;
        }
        if !state.desynced {
            return Correction::None;
        }

        // Released only on exact equality with the reference
        if track_time == reference {
            state.desynced = false;
            return Correction::None;
        }

        if delta > thresholds.jump || track_time < reference {
            state.desynced = false;
            return Correction::Seek(reference);
        }

        Correction::Pause
    }
}
