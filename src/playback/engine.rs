//! Playback controller driving the video and audio tracks as one unit.
//!
//! `MediaSync` is a single-threaded state machine. Commands (`play`, `pause`,
//! `seek`) and track events change its internal flags; only `tick` publishes
//! state, so subscribers see at most one snapshot per rendered frame.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::core::time::{self, Seconds, ZERO};
use crate::core::track::{TrackRole, TrackStatus};
use crate::media::environment::{AutoplayProbe, Visibility};
use crate::media::handle::{MediaError, MediaEvent, MediaTrackHandle};
use crate::playback::clock::{self, ReferencePolicy, StallTracker, TimeSource};
use crate::playback::state::{PlaybackSnapshot, TrackFailure};
use crate::playback::sync::{self, Correction, SyncController, SyncThresholds};

/// Error type for the playback controller
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Expected a {expected} track, got {found}")]
    RoleMismatch { expected: TrackRole, found: TrackRole },
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Identifies a snapshot subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&PlaybackSnapshot) + Send>;

struct TrackSlot {
    handle: Box<dyn MediaTrackHandle>,
    buffering: bool,
    failure: Option<TrackFailure>,
}

impl TrackSlot {
    fn new(handle: Box<dyn MediaTrackHandle>) -> Self {
        Self {
            handle,
            buffering: false,
            failure: None,
        }
    }

    fn healthy(&self) -> bool {
        self.failure.is_none()
    }
}

/// Dual-track synchronization controller
pub struct MediaSync {
    config: SyncConfig,
    /// Index-aligned with `TrackRole::index`
    tracks: Vec<TrackSlot>,
    sync: SyncController,
    clock: Arc<dyn TimeSource>,
    visibility: Arc<dyn Visibility>,
    stall: StallTracker,
    intended_playing: bool,
    last_reference: Seconds,
    volume: f32,
    last_snapshot: PlaybackSnapshot,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl MediaSync {
    /// Create a controller over a video and an audio track
    pub fn new(
        video: Box<dyn MediaTrackHandle>,
        audio: Box<dyn MediaTrackHandle>,
        config: SyncConfig,
        clock: Arc<dyn TimeSource>,
        visibility: Arc<dyn Visibility>,
    ) -> Result<Self, PlaybackError> {
        config.validate()?;
        let tracks = Self::slots(video, audio)?;
        let stall = StallTracker::new(config.stall_threshold());
        let sync = SyncController::new(SyncThresholds::from_config(&config), tracks.len());

        Ok(Self {
            config,
            tracks,
            sync,
            clock,
            visibility,
            stall,
            intended_playing: false,
            last_reference: ZERO,
            volume: 1.0,
            last_snapshot: PlaybackSnapshot::idle(),
            subscribers: Vec::new(),
            next_subscription: 0,
        })
    }

    fn slots(
        video: Box<dyn MediaTrackHandle>,
        audio: Box<dyn MediaTrackHandle>,
    ) -> Result<Vec<TrackSlot>, PlaybackError> {
        for (expected, handle) in [(TrackRole::Video, &video), (TrackRole::Audio, &audio)] {
            if handle.role() != expected {
                return Err(PlaybackError::RoleMismatch {
                    expected,
                    found: handle.role(),
                });
            }
        }
        Ok(vec![TrackSlot::new(video), TrackSlot::new(audio)])
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether the unit is logically playing
    pub fn is_playing(&self) -> bool {
        self.intended_playing
    }

    /// Snapshot published by the most recent tick
    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.last_snapshot
    }

    /// Shared duration: the shortest known track duration
    pub fn duration(&self) -> Option<Seconds> {
        self.tracks
            .iter()
            .filter_map(|t| t.handle.duration())
            .filter(|d| d.is_finite())
            .reduce(f64::min)
    }

    /// Start playback.
    ///
    /// Only the primary track is started here; the others are brought in by
    /// the next tick once correction allows it.
    pub fn play(&mut self) {
        // Events queued by earlier commands are not user input
        self.drain_events();
        if self.intended_playing {
            return;
        }
        info!("play requested at {:.3}s", self.last_reference);
        self.intended_playing = true;

        let primary = self.config.primary.index();
        let ready = self
            .tracks
            .get(primary)
            .is_some_and(|t| t.healthy() && !self.sync.is_desynced(primary));
        if ready {
            self.start_track(primary);
        }
    }

    /// Pause every track
    pub fn pause(&mut self) {
        self.drain_events();
        if self.intended_playing {
            info!("pause requested at {:.3}s", self.last_reference);
        }
        self.intended_playing = false;
        for slot in &mut self.tracks {
            if !slot.handle.is_paused() {
                slot.handle.pause();
            }
        }
    }

    /// Start playback only if the environment allows unattended playback.
    /// Returns whether playback was started.
    pub fn autoplay<P: AutoplayProbe + ?Sized>(&mut self, probe: &P) -> bool {
        if probe.can_autoplay() {
            self.play();
            self.intended_playing
        } else {
            debug!("autoplay not permitted, waiting for user action");
            false
        }
    }

    /// Jump every track to `position`, clamped to `[0, duration]`.
    ///
    /// Bypasses gradual correction and clears all sync flags. Returns the
    /// position actually used.
    pub fn seek(&mut self, position: Seconds) -> Seconds {
        // Correction pauses must be delivered while their track is still flagged
        self.drain_events();

        let target = time::clamp_position(position, self.duration());
        info!("seek to {:.3}s", target);

        for slot in self.tracks.iter_mut().filter(|t| t.healthy()) {
            slot.handle.set_position(target);
        }
        self.sync.reset_all();
        self.stall.reset(self.clock.now());
        self.last_reference = target;
        target
    }

    /// Set the output volume (clamped to 0.0-1.0) on every track
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        for slot in &mut self.tracks {
            slot.handle.set_volume(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Swap in new track handles for a different source.
    ///
    /// Correction state, failures and stall history of the old tracks are
    /// discarded. The intended play state carries over.
    pub fn replace_tracks(
        &mut self,
        video: Box<dyn MediaTrackHandle>,
        audio: Box<dyn MediaTrackHandle>,
    ) -> Result<(), PlaybackError> {
        self.tracks = Self::slots(video, audio)?;
        self.sync.reset_all();
        self.stall.reset(self.clock.now());
        self.last_reference = ZERO;
        let volume = self.volume;
        self.set_volume(volume);
        info!("switched source");
        Ok(())
    }

    /// Register a callback invoked with every published snapshot
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PlaybackSnapshot) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Replace the message of a failed track, e.g. with a server diagnostic
    pub fn attach_diagnostic(&mut self, role: TrackRole, message: impl Into<String>) {
        if let Some(failure) = self
            .tracks
            .get_mut(role.index())
            .and_then(|t| t.failure.as_mut())
        {
            failure.message = message.into();
        }
    }

    /// Source location of a track, if the handle knows it
    pub fn source_of(&self, role: TrackRole) -> Option<String> {
        self.tracks
            .get(role.index())
            .and_then(|t| t.handle.source())
            .map(str::to_string)
    }

    /// Current view of one track
    pub fn track_status(&self, role: TrackRole) -> Option<TrackStatus> {
        let index = role.index();
        self.tracks.get(index).map(|slot| TrackStatus {
            role,
            position: slot.handle.position(),
            duration: slot.handle.duration(),
            paused: slot.handle.is_paused(),
            buffered: slot.handle.buffered(),
            buffering: slot.buffering,
            desynced: self.sync.is_desynced(index),
            failure: slot.failure.as_ref().map(|f| f.message.clone()),
        })
    }

    /// Apply an event reported by a track.
    ///
    /// Play/pause events only change the intended state when they are a real
    /// transition, the track is not mid-correction, and they are not a hidden
    /// video element being paused by the environment.
    pub fn handle_event(&mut self, role: TrackRole, event: MediaEvent) {
        let index = role.index();
        let Some(slot) = self.tracks.get_mut(index) else {
            return;
        };

        match event {
            MediaEvent::Play | MediaEvent::Pause => {
                let playing = event == MediaEvent::Play;
                if playing == self.intended_playing {
                    return;
                }
                if self.sync.is_desynced(index) {
                    trace!("{} {:?} ignored during correction", role, event);
                    return;
                }
                if role == TrackRole::Video && !self.visibility.is_visible() {
                    trace!("hidden video {:?} ignored", event);
                    return;
                }
                info!("{} reported {:?}, following", role, event);
                self.intended_playing = playing;
            }
            MediaEvent::Waiting | MediaEvent::Stalled => {
                if !slot.buffering {
                    debug!("{} is buffering", role);
                }
                slot.buffering = true;
            }
            MediaEvent::TimeUpdate | MediaEvent::Seeked => {
                slot.buffering = false;
            }
            MediaEvent::Seeking => {}
            MediaEvent::Error(error) => {
                warn!("{} track failed: {}", role, error);
                slot.failure = Some(TrackFailure {
                    role,
                    message: error.to_string(),
                    source: slot.handle.source().map(str::to_string),
                });
                slot.buffering = false;
                self.sync.reset(index);
            }
        }
    }

    /// Deliver every event the tracks have queued since the last call
    pub fn drain_events(&mut self) {
        let mut pending = Vec::new();
        for slot in &mut self.tracks {
            let role = slot.handle.role();
            while let Some(event) = slot.handle.poll_event() {
                pending.push((role, event));
            }
        }
        for (role, event) in pending {
            self.handle_event(role, event);
        }
    }

    /// Advance one frame: reconcile events, correct drift, publish a snapshot
    pub fn tick(&mut self) -> PlaybackSnapshot {
        self.drain_events();

        let now = self.clock.now();
        let policy = ReferencePolicy::for_visibility(self.visibility.is_visible());
        let positions: Vec<Option<Seconds>> = self
            .tracks
            .iter()
            .map(|t| t.healthy().then(|| t.handle.position()))
            .collect();

        let reference = clock::reference_time(positions.iter().flatten().copied(), policy)
            .unwrap_or(self.last_reference);
        self.last_reference = reference;
        let stalled = self.stall.observe(reference, now, self.intended_playing);

        if self.intended_playing {
            self.correct(&positions, reference);
        }
        self.align_play_state();

        let snapshot = PlaybackSnapshot {
            reference_time: reference,
            duration: self.duration(),
            is_playing: self.intended_playing,
            is_fully_synced: self.sync.all_synced(),
            is_stalled: stalled,
            error: self.tracks.iter().find_map(|t| t.failure.clone()),
        };
        self.publish(&snapshot);
        snapshot
    }

    fn correct(&mut self, positions: &[Option<Seconds>], reference: Seconds) {
        let thresholds = self.sync.thresholds();
        for (index, position) in positions.iter().enumerate() {
            let Some(position) = *position else {
                continue;
            };
            let slot = &mut self.tracks[index];
            match self.sync.evaluate(index, position, reference) {
                Correction::Seek(target) => {
                    debug!(
                        "{} off by {:+.3}s ({:?}), seeking to {:.3}s",
                        slot.handle.role(),
                        position - reference,
                        sync::classify(position - reference, thresholds),
                        target
                    );
                    slot.handle.set_position(target);
                }
                Correction::Pause => {
                    if !slot.handle.is_paused() {
                        debug!(
                            "{} ahead by {:.3}s, holding",
                            slot.handle.role(),
                            position - reference
                        );
                        slot.handle.pause();
                    }
                }
                Correction::None => {}
            }
        }
    }

    /// Bring every unflagged, healthy track into the intended play state
    fn align_play_state(&mut self) {
        for index in 0..self.tracks.len() {
            if self.sync.is_desynced(index) || !self.tracks[index].healthy() {
                continue;
            }
            let paused = self.tracks[index].handle.is_paused();
            if self.intended_playing && paused {
                if !self.start_track(index) {
                    break;
                }
            } else if !self.intended_playing && !paused {
                self.tracks[index].handle.pause();
            }
        }
    }

    /// Ask one track to play. A rejection leaves the unit paused.
    fn start_track(&mut self, index: usize) -> bool {
        match self.tracks[index].handle.play() {
            Ok(()) => true,
            Err(MediaError::PlaybackRejected(reason)) => {
                info!("playback rejected ({}), staying paused", reason);
                self.pause();
                false
            }
            Err(error) => {
                let role = self.tracks[index].handle.role();
                self.handle_event(role, MediaEvent::Error(error));
                true
            }
        }
    }

    fn publish(&mut self, snapshot: &PlaybackSnapshot) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(snapshot);
        }
        self.last_snapshot = snapshot.clone();
    }
}
