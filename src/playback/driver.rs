//! Threaded frame loop around `MediaSync`.
//! Commands reach the sync thread over a crossbeam channel; snapshots come
//! back on another. The controller itself never leaves its thread.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, TryRecvError};
use tracing::{debug, trace};

use crate::core::time::Seconds;
use crate::core::track::TrackRole;
use crate::playback::engine::MediaSync;
use crate::playback::state::PlaybackSnapshot;

/// Snapshots buffered for a slow consumer before new ones are dropped
const SNAPSHOT_BACKLOG: usize = 120;

/// Command sent to the sync thread
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek(Seconds),
    SetVolume(f32),
    /// Replace the message of a failed track
    AttachDiagnostic { role: TrackRole, message: String },
    Shutdown,
}

/// Error type for the driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to spawn sync thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Sync thread is no longer running")]
    Disconnected,
    #[error("Sync thread panicked")]
    Panicked,
}

/// "Invoke before the next repaint"
pub trait FrameScheduler {
    /// Block until the next frame is due
    fn wait_for_frame(&mut self);
}

/// Fixed-rate scheduler. Late frames are not made up in a burst.
#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Duration,
    next: Option<Instant>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }
}

impl FrameScheduler for IntervalScheduler {
    fn wait_for_frame(&mut self) {
        let now = Instant::now();
        let due = self.next.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next = Some(due.max(now) + self.interval);
    }
}

/// Owns the sync thread
pub struct SyncDriver {
    command_tx: channel::Sender<PlaybackCommand>,
    snapshot_rx: channel::Receiver<PlaybackSnapshot>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SyncDriver {
    /// Move `sync` onto a new thread ticking at `scheduler`'s pace
    pub fn spawn<S>(mut sync: MediaSync, mut scheduler: S) -> Result<Self, DriverError>
    where
        S: FrameScheduler + Send + 'static,
    {
        let (command_tx, command_rx) = channel::unbounded();
        let (snapshot_tx, snapshot_rx) = channel::bounded(SNAPSHOT_BACKLOG);

        sync.subscribe(move |snapshot: &PlaybackSnapshot| {
            if snapshot_tx.try_send(snapshot.clone()).is_err() {
                trace!("snapshot dropped, consumer is behind");
            }
        });

        let thread_handle = thread::Builder::new()
            .name("vodsync-sync".to_string())
            .spawn(move || {
                debug!("sync thread started");
                loop {
                    scheduler.wait_for_frame();
                    if !apply_commands(&mut sync, &command_rx) {
                        sync.pause();
                        break;
                    }
                    sync.tick();
                }
                debug!("sync thread stopped");
            })?;

        Ok(Self {
            command_tx,
            snapshot_rx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn send(&self, command: PlaybackCommand) -> Result<(), DriverError> {
        self.command_tx
            .send(command)
            .map_err(|_| DriverError::Disconnected)
    }

    pub fn play(&self) -> Result<(), DriverError> {
        self.send(PlaybackCommand::Play)
    }

    pub fn pause(&self) -> Result<(), DriverError> {
        self.send(PlaybackCommand::Pause)
    }

    pub fn seek(&self, position: Seconds) -> Result<(), DriverError> {
        self.send(PlaybackCommand::Seek(position))
    }

    pub fn attach_diagnostic(&self, role: TrackRole, message: impl Into<String>) -> Result<(), DriverError> {
        self.send(PlaybackCommand::AttachDiagnostic {
            role,
            message: message.into(),
        })
    }

    /// Published snapshots, one per tick
    pub fn snapshots(&self) -> &channel::Receiver<PlaybackSnapshot> {
        &self.snapshot_rx
    }

    /// Most recent snapshot, discarding older queued ones
    pub fn latest_snapshot(&self) -> Option<PlaybackSnapshot> {
        self.snapshot_rx.try_iter().last()
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) -> Result<(), DriverError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        // The thread may already be gone; joining reports how it ended
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);
        handle.join().map_err(|_| DriverError::Panicked)
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Apply queued commands. Returns false once the loop should end.
fn apply_commands(sync: &mut MediaSync, commands: &channel::Receiver<PlaybackCommand>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(PlaybackCommand::Play) => sync.play(),
            Ok(PlaybackCommand::Pause) => sync.pause(),
            Ok(PlaybackCommand::Seek(position)) => {
                sync.seek(position);
            }
            Ok(PlaybackCommand::SetVolume(volume)) => sync.set_volume(volume),
            Ok(PlaybackCommand::AttachDiagnostic { role, message }) => {
                sync.attach_diagnostic(role, message)
            }
            Ok(PlaybackCommand::Shutdown) | Err(TryRecvError::Disconnected) => return false,
            Err(TryRecvError::Empty) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::fetch::{diagnose_failure, FileFetcher};
    use crate::media::environment::SharedVisibility;
    use crate::media::simulated::SimulatedTrack;
    use crate::media::{MediaError, MediaTrackHandle};
    use crate::playback::clock::ManualTimeSource;
    use std::io::Write;
    use std::sync::Arc;

    fn controller(source: Option<&str>) -> (MediaSync, SimulatedTrack, SimulatedTrack) {
        let clock = ManualTimeSource::new();
        let mut video =
            SimulatedTrack::new(TrackRole::Video, Arc::new(clock.clone())).with_duration(120.0);
        if let Some(source) = source {
            video = video.with_source(source);
        }
        let audio =
            SimulatedTrack::new(TrackRole::Audio, Arc::new(clock.clone())).with_duration(120.0);
        let sync = MediaSync::new(
            Box::new(video.clone()),
            Box::new(audio.clone()),
            SyncConfig::default(),
            Arc::new(clock),
            Arc::new(SharedVisibility::default()),
        )
        .unwrap();
        (sync, video, audio)
    }

    fn driver() -> (SyncDriver, SimulatedTrack, SimulatedTrack) {
        driver_with_source(None)
    }

    fn driver_with_source(source: Option<&str>) -> (SyncDriver, SimulatedTrack, SimulatedTrack) {
        let (sync, video, audio) = controller(source);
        let driver = SyncDriver::spawn(sync, IntervalScheduler::new(Duration::from_millis(1))).unwrap();
        (driver, video, audio)
    }

    /// Runs a frame only when the test releases one
    struct GatedScheduler(channel::Receiver<()>);

    impl FrameScheduler for GatedScheduler {
        fn wait_for_frame(&mut self) {
            let _ = self.0.recv_timeout(Duration::from_secs(5));
        }
    }

    fn frame(driver: &SyncDriver, gate: &channel::Sender<()>) -> PlaybackSnapshot {
        gate.send(()).unwrap();
        wait_for(driver, |_| true)
    }

    fn wait_for<F: Fn(&PlaybackSnapshot) -> bool>(driver: &SyncDriver, predicate: F) -> PlaybackSnapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let snapshot = driver
                .snapshots()
                .recv_timeout(remaining)
                .expect("no matching snapshot before deadline");
            if predicate(&snapshot) {
                return snapshot;
            }
        }
    }

    #[test]
    fn test_interval_scheduler_paces_frames() {
        let mut scheduler = IntervalScheduler::new(Duration::from_millis(5));
        let start = Instant::now();
        for _ in 0..4 {
            scheduler.wait_for_frame();
        }
        // First frame is immediate, then three intervals
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_commands_reach_controller() {
        let (driver, video, audio) = driver();

        driver.play().unwrap();
        wait_for(&driver, |s| s.is_playing);

        driver.seek(30.0).unwrap();
        let snapshot = wait_for(&driver, |s| s.reference_time == 30.0);
        assert!(snapshot.is_fully_synced);

        driver.send(PlaybackCommand::SetVolume(0.25)).unwrap();
        driver.pause().unwrap();
        wait_for(&driver, |s| !s.is_playing);
        assert_eq!(audio.volume(), 0.25);

        driver.shutdown().unwrap();
        assert!(video.is_paused());
        assert!(audio.is_paused());
    }

    #[test]
    fn test_pause_then_play_in_one_frame_keeps_playing() {
        let (sync, video, audio) = controller(None);
        let (gate, frames) = channel::unbounded();
        let driver = SyncDriver::spawn(sync, GatedScheduler(frames)).unwrap();

        driver.play().unwrap();
        frame(&driver, &gate);
        assert!(frame(&driver, &gate).is_playing);
        assert!(!audio.is_paused());

        // Both commands are applied before the same tick
        driver.pause().unwrap();
        driver.play().unwrap();
        assert!(frame(&driver, &gate).is_playing);
        assert!(frame(&driver, &gate).is_playing);
        assert!(!video.is_paused());
        assert!(!audio.is_paused());

        drop(gate);
        driver.shutdown().unwrap();
    }

    #[test]
    fn test_play_then_pause_in_one_frame_stays_paused() {
        let (sync, video, audio) = controller(None);
        let (gate, frames) = channel::unbounded();
        let driver = SyncDriver::spawn(sync, GatedScheduler(frames)).unwrap();

        driver.play().unwrap();
        driver.pause().unwrap();
        assert!(!frame(&driver, &gate).is_playing);
        assert!(!frame(&driver, &gate).is_playing);
        assert!(video.is_paused());
        assert!(audio.is_paused());

        drop(gate);
        driver.shutdown().unwrap();
    }

    #[test]
    fn test_server_diagnostic_reaches_snapshot() {
        let mut body = tempfile::NamedTempFile::new().unwrap();
        body.write_all(b"<Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>")
            .unwrap();
        let location = body.path().to_str().unwrap().to_string();
        let (driver, video, _audio) = driver_with_source(Some(&location));
        driver.play().unwrap();
        wait_for(&driver, |s| s.is_playing);

        video.fail(MediaError::Network("HTTP 403".to_string()));
        let failure = wait_for(&driver, |s| s.error.is_some()).error.unwrap();
        assert_eq!(failure.role, TrackRole::Video);
        assert_eq!(failure.source.as_deref(), Some(location.as_str()));
        assert!(failure.message.contains("403"));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let message = runtime
            .block_on(diagnose_failure(&FileFetcher, &failure))
            .unwrap();
        driver.attach_diagnostic(failure.role, message).unwrap();

        let snapshot = wait_for(&driver, |s| {
            s.error
                .as_ref()
                .is_some_and(|e| e.message == "Request has expired")
        });
        assert!(snapshot.is_playing);
    }

    #[test]
    fn test_drop_stops_thread() {
        let (driver, video, _audio) = driver();
        driver.play().unwrap();
        wait_for(&driver, |s| s.is_playing);
        drop(driver);
        assert!(video.is_paused());
    }
}
