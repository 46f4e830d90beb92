//! Track roles and buffered-range bookkeeping for the two media tracks.
//! A logical playback unit is one silent video track plus one audio track.

use crate::core::time::Seconds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a media track within the playback unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackRole {
    Video,
    Audio,
}

impl TrackRole {
    /// Index of the role in the controller's track array
    pub fn index(self) -> usize {
        match self {
            TrackRole::Video => 0,
            TrackRole::Audio => 1,
        }
    }
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRole::Video => write!(f, "video"),
            TrackRole::Audio => write!(f, "audio"),
        }
    }
}

/// A half-open buffered interval `[start, end)` in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: Seconds,
    pub end: Seconds,
}

impl TimeRange {
    pub fn new(start: Seconds, end: Seconds) -> Self {
        Self { start, end }
    }

    /// Check if a position lies within this range
    pub fn contains(&self, position: Seconds) -> bool {
        position >= self.start && position < self.end
    }

    pub fn duration(&self) -> Seconds {
        self.end - self.start
    }
}

/// Buffered ranges of a track.
///
/// Ranges are kept sorted by `start` and never overlap; touching or
/// overlapping ranges are merged on insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Build from arbitrary ranges, normalizing order and overlaps
    pub fn from_ranges<I: IntoIterator<Item = TimeRange>>(ranges: I) -> Self {
        let mut result = Self::new();
        for range in ranges {
            result.add(range.start, range.end);
        }
        result
    }

    /// Add a range, merging it with any range it overlaps or touches.
    /// Empty or inverted ranges are ignored.
    pub fn add(&mut self, start: Seconds, end: Seconds) {
        if !(end > start) {
            return;
        }

        let mut merged = TimeRange::new(start, end);
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.end < merged.start || range.start > merged.end {
                kept.push(range);
            } else {
                merged.start = merged.start.min(range.start);
                merged.end = merged.end.max(range.end);
            }
        }
        kept.push(merged);
        kept.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.ranges = kept;
    }

    /// Check if a position is buffered
    pub fn contains(&self, position: Seconds) -> bool {
        self.ranges.iter().any(|r| r.contains(position))
    }

    /// End of the buffered range containing `position`, if any
    pub fn end_of_range_at(&self, position: Seconds) -> Option<Seconds> {
        self.ranges
            .iter()
            .find(|r| r.contains(position))
            .map(|r| r.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Point-in-time view of one track, as seen by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStatus {
    pub role: TrackRole,
    pub position: Seconds,
    pub duration: Option<Seconds>,
    pub paused: bool,
    pub buffered: TimeRanges,
    /// Track reported `waiting`/`stalled` and has not resumed yet
    pub buffering: bool,
    /// Currently flagged as desynchronized from the reference clock
    pub desynced: bool,
    /// Error message if the track failed
    pub failure: Option<String>,
}
