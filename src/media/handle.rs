//! Control surface of a single media track.
//! The controller only talks to tracks through `MediaTrackHandle`, so a
//! browser element, a native decoder or a simulation can sit behind it.

use crate::core::time::Seconds;
use crate::core::track::{TimeRanges, TrackRole};

/// Error type for media tracks
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    /// The environment refused to start playback (e.g. autoplay policy)
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Source not supported: {0}")]
    SourceNotSupported(String),
}

/// Events reported by a track on its own.
///
/// These are advisory: the controller reconciles them against its own
/// intended state instead of trusting them.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Play,
    Pause,
    Seeking,
    Seeked,
    Waiting,
    Stalled,
    TimeUpdate,
    Error(MediaError),
}

/// Handle to an underlying media track.
///
/// Commands are fire-and-forget: the effect of `set_position` or `play` may
/// only become visible through `position`/`is_paused` on a later tick.
pub trait MediaTrackHandle: Send {
    fn role(&self) -> TrackRole;

    /// Current playback position
    fn position(&self) -> Seconds;

    /// Jump directly to a position
    fn set_position(&mut self, position: Seconds);

    /// Total duration, `None` while unknown
    fn duration(&self) -> Option<Seconds>;

    fn is_paused(&self) -> bool;

    /// Request playback. Rejection by the environment is reported as
    /// `MediaError::PlaybackRejected`.
    fn play(&mut self) -> Result<(), MediaError>;

    fn pause(&mut self);

    fn buffered(&self) -> TimeRanges;

    fn set_volume(&mut self, _volume: f32) {}

    /// Location of the underlying source, used for error diagnostics
    fn source(&self) -> Option<&str> {
        None
    }

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<MediaEvent>;
}
