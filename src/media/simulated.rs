//! In-process media track driven by a `TimeSource`.
//!
//! Position advances at `rate` while playing and freezes at the end of the
//! buffered range, which is how a real element behaves while waiting for
//! network data. Clones share state, so one clone can be handed to the
//! controller while another is used to inject drift, stalls and failures.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::time::{self, Seconds, ZERO};
use crate::core::track::{TimeRanges, TrackRole};
use crate::media::handle::{MediaError, MediaEvent, MediaTrackHandle};
use crate::playback::clock::TimeSource;

struct SimState {
    anchor_position: Seconds,
    anchor_time: Duration,
    paused: bool,
    rate: f64,
    duration: Option<Seconds>,
    /// Data is available up to here; `None` means fully buffered
    buffered_until: Option<Seconds>,
    waiting: bool,
    failure: Option<MediaError>,
    reject_play: bool,
    volume: f32,
    events: VecDeque<MediaEvent>,
}

impl SimState {
    fn position_at(&self, now: Duration) -> Seconds {
        if self.paused || self.failure.is_some() {
            return self.anchor_position;
        }

        let elapsed = time::from_duration(now.saturating_sub(self.anchor_time));
        let mut position = self.anchor_position + elapsed * self.rate;
        if let Some(limit) = self.buffered_until {
            position = position.min(limit.max(self.anchor_position));
        }
        if let Some(duration) = self.duration {
            position = position.min(duration);
        }
        position
    }

    /// Re-anchor so that later rate or state changes apply from `now`
    fn settle(&mut self, now: Duration) {
        self.anchor_position = self.position_at(now);
        self.anchor_time = now;
    }

    fn starved(&self, position: Seconds) -> bool {
        !self.paused
            && self.failure.is_none()
            && self.buffered_until.is_some_and(|limit| position >= limit)
    }
}

/// Simulated media track
#[derive(Clone)]
pub struct SimulatedTrack {
    role: TrackRole,
    source: Option<String>,
    clock: Arc<dyn TimeSource>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTrack {
    /// Create a paused, fully buffered track at position zero
    pub fn new(role: TrackRole, clock: Arc<dyn TimeSource>) -> Self {
        let anchor_time = clock.now();
        Self {
            role,
            source: None,
            clock,
            state: Arc::new(Mutex::new(SimState {
                anchor_position: ZERO,
                anchor_time,
                paused: true,
                rate: 1.0,
                duration: None,
                buffered_until: None,
                waiting: false,
                failure: None,
                reject_play: false,
                volume: 1.0,
                events: VecDeque::new(),
            })),
        }
    }

    pub fn with_duration(self, duration: Seconds) -> Self {
        self.state.lock().duration = Some(duration);
        self
    }

    pub fn with_rate(self, rate: f64) -> Self {
        self.set_rate(rate);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Change the playback rate, e.g. to model a decoder falling behind
    pub fn set_rate(&self, rate: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.rate = rate;
    }

    /// Shift the position by `offset` without emitting seek events
    pub fn nudge(&self, offset: Seconds) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.anchor_position = (state.anchor_position + offset).max(ZERO);
    }

    /// Stop data arriving: playback freezes at the current position
    pub fn stall(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.buffered_until = Some(state.anchor_position);
    }

    /// Limit buffered data to `until`
    pub fn buffer_until(&self, until: Seconds) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.buffered_until = Some(until);
        if state.waiting && until > state.anchor_position {
            state.waiting = false;
            state.events.push_back(MediaEvent::TimeUpdate);
        }
    }

    /// Make everything available again
    pub fn resume_buffering(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.buffered_until = None;
        if state.waiting {
            state.waiting = false;
            state.events.push_back(MediaEvent::TimeUpdate);
        }
    }

    /// Fail the track with `error`
    pub fn fail(&self, error: MediaError) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.settle(now);
        state.failure = Some(error.clone());
        state.events.push_back(MediaEvent::Error(error));
    }

    /// Make subsequent `play` calls fail as if blocked by autoplay policy
    pub fn reject_play(&self, reject: bool) {
        self.state.lock().reject_play = reject;
    }

    /// Queue an event as if the environment emitted it
    pub fn emit(&self, event: MediaEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Flip the paused flag as the environment would (e.g. background
    /// autopause), emitting the matching event
    pub fn external_pause(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !state.paused {
            state.settle(now);
            state.paused = true;
            state.events.push_back(MediaEvent::Pause);
        }
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Number of queued events not yet polled
    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl MediaTrackHandle for SimulatedTrack {
    fn role(&self) -> TrackRole {
        self.role
    }

    fn position(&self) -> Seconds {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let position = state.position_at(now);
        if state.starved(position) && !state.waiting {
            state.waiting = true;
            state.events.push_back(MediaEvent::Waiting);
        }
        position
    }

    fn set_position(&mut self, position: Seconds) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let position = time::clamp_position(position, state.duration);
        state.anchor_position = position;
        state.anchor_time = now;
        state.waiting = false;
        state.events.push_back(MediaEvent::Seeking);
        state.events.push_back(MediaEvent::Seeked);
    }

    fn duration(&self) -> Option<Seconds> {
        self.state.lock().duration
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn play(&mut self) -> Result<(), MediaError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.reject_play {
            return Err(MediaError::PlaybackRejected(
                "play() is not allowed without user interaction".to_string(),
            ));
        }
        if state.paused {
            state.settle(now);
            state.paused = false;
            state.events.push_back(MediaEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !state.paused {
            state.settle(now);
            state.paused = true;
            state.events.push_back(MediaEvent::Pause);
        }
    }

    fn buffered(&self) -> TimeRanges {
        let state = self.state.lock();
        let mut ranges = TimeRanges::new();
        let end = state
            .buffered_until
            .or(state.duration)
            .unwrap_or(f64::INFINITY);
        ranges.add(ZERO, end);
        ranges
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.state.lock().events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock::ManualTimeSource;

    fn track(clock: &ManualTimeSource) -> SimulatedTrack {
        SimulatedTrack::new(TrackRole::Audio, Arc::new(clock.clone())).with_duration(60.0)
    }

    fn drain(handle: &mut SimulatedTrack) -> Vec<MediaEvent> {
        std::iter::from_fn(|| handle.poll_event()).collect()
    }

    #[test]
    fn test_advances_only_while_playing() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock);

        clock.advance_secs(1.0);
        assert_eq!(handle.position(), 0.0);

        handle.play().unwrap();
        clock.advance_secs(2.0);
        assert!((handle.position() - 2.0).abs() < 1e-9);

        handle.pause();
        clock.advance_secs(5.0);
        assert!((handle.position() - 2.0).abs() < 1e-9);
        assert_eq!(drain(&mut handle), vec![MediaEvent::Play, MediaEvent::Pause]);
    }

    #[test]
    fn test_rate_and_nudge() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock).with_rate(0.5);
        handle.play().unwrap();
        clock.advance_secs(2.0);
        assert!((handle.position() - 1.0).abs() < 1e-9);

        handle.nudge(0.25);
        assert!((handle.position() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_stall_freezes_and_emits_waiting() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock);
        handle.play().unwrap();
        clock.advance_secs(1.0);
        handle.stall();
        clock.advance_secs(3.0);

        assert!((handle.position() - 1.0).abs() < 1e-9);
        let events = drain(&mut handle);
        assert_eq!(events.last(), Some(&MediaEvent::Waiting));

        handle.resume_buffering();
        clock.advance_secs(1.0);
        assert!((handle.position() - 2.0).abs() < 1e-9);
        assert_eq!(drain(&mut handle), vec![MediaEvent::TimeUpdate]);
    }

    #[test]
    fn test_set_position_clamps_to_duration() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock);
        handle.set_position(90.0);
        assert_eq!(handle.position(), 60.0);
        assert_eq!(
            drain(&mut handle),
            vec![MediaEvent::Seeking, MediaEvent::Seeked]
        );
    }

    #[test]
    fn test_reject_play() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock);
        handle.reject_play(true);
        assert!(matches!(handle.play(), Err(MediaError::PlaybackRejected(_))));
        assert!(handle.is_paused());
        assert_eq!(handle.pending_events(), 0);
    }

    #[test]
    fn test_failure_freezes_position() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock);
        handle.play().unwrap();
        clock.advance_secs(1.0);
        handle.fail(MediaError::Network("connection reset".to_string()));
        clock.advance_secs(1.0);

        assert!((handle.position() - 1.0).abs() < 1e-9);
        let events = drain(&mut handle);
        assert!(matches!(events.last(), Some(MediaEvent::Error(MediaError::Network(_)))));
    }

    #[test]
    fn test_clones_share_state() {
        let clock = ManualTimeSource::new();
        let mut handle = track(&clock).with_source("https://cdn.example/audio.m4a");
        let observer = handle.clone();
        handle.set_volume(1.7);
        assert_eq!(observer.volume(), 1.0);
        assert_eq!(observer.source(), Some("https://cdn.example/audio.m4a"));
    }
}
