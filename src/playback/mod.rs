//! Dual-track playback: clock source, drift correction, controller and the
//! threaded frame loop.

pub mod clock;
pub mod driver;
pub mod engine;
pub mod state;
pub mod sync;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use driver::{FrameScheduler, IntervalScheduler, PlaybackCommand, SyncDriver};
pub use engine::{MediaSync, PlaybackError, SubscriptionId};
pub use state::{PlaybackPhase, PlaybackSnapshot, TrackFailure};
pub use sync::{SyncController, SyncThresholds};
