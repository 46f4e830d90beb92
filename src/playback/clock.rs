//! Clock source for synchronization.
//!
//! Provides the wall-clock time used for stall accounting and derives the
//! shared reference time from the positions the tracks report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::time::Seconds;

/// Monotonic time since an arbitrary origin
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced time source (nanoseconds), for deterministic stepping
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    nanos: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, seconds: f64) {
        self.advance(Duration::from_secs_f64(seconds));
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Which track position defines the shared clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePolicy {
    /// Furthest-behind track; used while the page is visible so audio cannot
    /// race ahead of a buffering video.
    Earliest,
    /// Furthest-ahead track; used while hidden, where video decode may be
    /// starved and audio is still serviced.
    Latest,
}

impl ReferencePolicy {
    pub fn for_visibility(visible: bool) -> Self {
        if visible {
            ReferencePolicy::Earliest
        } else {
            ReferencePolicy::Latest
        }
    }
}

/// Reference time over the given positions, `None` if there are none
pub fn reference_time<I>(positions: I, policy: ReferencePolicy) -> Option<Seconds>
where
    I: IntoIterator<Item = Seconds>,
{
    let mut positions = positions.into_iter().filter(|p| p.is_finite());
    let first = positions.next()?;
    Some(positions.fold(first, |acc, p| match policy {
        ReferencePolicy::Earliest => acc.min(p),
        ReferencePolicy::Latest => acc.max(p),
    }))
}

/// Detects a reference clock that stopped advancing
#[derive(Debug, Clone)]
pub struct StallTracker {
    threshold: Duration,
    last_reference: Option<Seconds>,
    last_advance: Duration,
}

impl StallTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_reference: None,
            last_advance: Duration::ZERO,
        }
    }

    /// Record the reference observed at `now` and report whether it is stale.
    ///
    /// Only counts while `playing`; a paused clock is expected to be static.
    pub fn observe(&mut self, reference: Seconds, now: Duration, playing: bool) -> bool {
        let advanced = self.last_reference != Some(reference);
        if advanced || !playing {
            self.last_reference = Some(reference);
            self.last_advance = now;
            return false;
        }
        now.saturating_sub(self.last_advance) > self.threshold
    }

    /// Forget history, e.g. after a seek or a source switch
    pub fn reset(&mut self, now: Duration) {
        self.last_reference = None;
        self.last_advance = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_source() {
        let clock = ManualTimeSource::new();
        let shared = clock.clone();
        clock.advance(Duration::from_millis(250));
        clock.advance_secs(0.75);
        assert_eq!(shared.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_reference_earliest_and_latest() {
        let positions = [10.0, 10.08];
        assert_eq!(reference_time(positions, ReferencePolicy::Earliest), Some(10.0));
        assert_eq!(reference_time(positions, ReferencePolicy::Latest), Some(10.08));
    }

    #[test]
    fn test_reference_empty_and_nan() {
        assert_eq!(reference_time(Vec::new(), ReferencePolicy::Earliest), None);
        assert_eq!(
            reference_time([f64::NAN, 3.0], ReferencePolicy::Latest),
            Some(3.0)
        );
    }

    #[test]
    fn test_policy_for_visibility() {
        assert_eq!(ReferencePolicy::for_visibility(true), ReferencePolicy::Earliest);
        assert_eq!(ReferencePolicy::for_visibility(false), ReferencePolicy::Latest);
    }

    #[test]
    fn test_stall_after_threshold() {
        let mut tracker = StallTracker::new(Duration::from_millis(1000));
        assert!(!tracker.observe(5.0, Duration::from_millis(0), true));
        assert!(!tracker.observe(5.0, Duration::from_millis(1000), true));
        assert!(tracker.observe(5.0, Duration::from_millis(1001), true));
        // Advancing clears it immediately
        assert!(!tracker.observe(5.1, Duration::from_millis(1100), true));
    }

    #[test]
    fn test_no_stall_while_paused() {
        let mut tracker = StallTracker::new(Duration::from_millis(1000));
        tracker.observe(5.0, Duration::ZERO, false);
        assert!(!tracker.observe(5.0, Duration::from_secs(10), false));
        // Resuming starts the window fresh
        assert!(!tracker.observe(5.0, Duration::from_millis(10_500), true));
    }
}
