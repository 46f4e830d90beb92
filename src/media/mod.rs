//! Media track abstraction and the environment signals the player consumes.

pub mod environment;
pub mod handle;
pub mod simulated;

pub use environment::{AutoplayPolicy, AutoplayProbe, SharedVisibility, Visibility};
pub use handle::{MediaError, MediaEvent, MediaTrackHandle};
pub use simulated::SimulatedTrack;
