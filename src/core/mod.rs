//! Core types shared by the playback and chat subsystems.
//!
//! All media positions are `f64` seconds, matching what media elements report.

pub mod time;
pub mod track;

// Re-export core data structures for easier access.
pub use time::{Seconds, ZERO};
pub use track::{TimeRange, TimeRanges, TrackRole, TrackStatus};
