//! narayana-talk: talk-motion bridge between a host application and an avatar engine
//!
//! The host drives an avatar speech/motion engine through a string-only call
//! boundary:
//! - Commands (`PrepareAudio`, `Play`, `Chat`, `ChangeAvatar`, ...) come in as
//!   a method name plus a JSON payload
//! - Notifications (`OnPrepared`, `OnPlaybackStarted`, ...) go back through a
//!   fixed callback surface
//! - Decodes and engine round-trips complete asynchronously and are re-checked
//!   once per host tick
//! - The active avatar can be hot-swapped; events from a torn-down avatar are
//!   dropped by generation

pub mod error;
pub mod config;
pub mod ingestion;
pub mod engine;
pub mod scene;
pub mod emitter;
pub mod correlator;
pub mod timeline;
pub mod lifecycle;
pub mod command;
pub mod bridge;
pub mod sim;

pub use crate::error::BridgeError;
pub use crate::config::{AvatarAssetConfig, BridgeConfig};
pub use crate::bridge::{Bridge, PlaybackPhase};
pub use crate::command::Command;
pub use crate::emitter::{HostCallbacks, HostEvent, WireMessage};
pub use crate::engine::{AudioOutput, AvatarEngine, EngineEvent};
pub use crate::ingestion::{AudioDecoder, AudioFormat, DecodeStatus, DecodedAudio};
pub use crate::scene::{AvatarScene, Background};
pub use crate::timeline::{TimelineDocument, TimelinePlayer};
