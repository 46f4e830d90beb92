//! vodsync - synchronized playback of split video/audio tracks with a
//! replayed live chat.
//!
//! - `playback`: the dual-track sync controller and its frame loop
//! - `media`: the track handle seam and a simulated track
//! - `chat`: chat replay parsing and the trailing window

pub mod chat;
pub mod config;
pub mod core;
pub mod fetch;
pub mod logging;
pub mod media;
pub mod playback;
pub mod prefs;

pub use chat::{parse_chat_replay, ChatMessage, ParseError, ReplayWindow};
pub use config::{ConfigError, SyncConfig};
pub use playback::{MediaSync, PlaybackSnapshot, SyncDriver};
