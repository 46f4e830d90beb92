//! Playback snapshot published once per tick.

use crate::core::time::Seconds;
use crate::core::track::TrackRole;

/// A failed track and the best message available for it
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFailure {
    pub role: TrackRole,
    pub message: String,
    /// Location the failed track was loading, used to fetch a diagnostic
    pub source: Option<String>,
}

/// Coarse playback state derived from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Paused,
    Playing,
    /// Playing intended, but the reference clock is not advancing
    Stalled,
    Failed,
}

/// Complete view of the playback unit at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub reference_time: Seconds,
    pub duration: Option<Seconds>,
    pub is_playing: bool,
    pub is_fully_synced: bool,
    pub is_stalled: bool,
    pub error: Option<TrackFailure>,
}

impl PlaybackSnapshot {
    /// Snapshot of an idle unit at position zero
    pub fn idle() -> Self {
        Self {
            reference_time: 0.0,
            duration: None,
            is_playing: false,
            is_fully_synced: true,
            is_stalled: false,
            error: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        if self.error.is_some() {
            PlaybackPhase::Failed
        } else if !self.is_playing {
            PlaybackPhase::Paused
        } else if self.is_stalled {
            PlaybackPhase::Stalled
        } else {
            PlaybackPhase::Playing
        }
    }

    /// Fraction of the duration played, if the duration is known
    pub fn progress(&self) -> Option<f64> {
        match self.duration {
            Some(d) if d > 0.0 => Some((self.reference_time / d).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
