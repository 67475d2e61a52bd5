//! Avatar engine collaborator interface
//!
//! The engine owns TTS, motion generation and its own cache. The bridge only
//! calls into it and receives its callbacks. Callbacks travel through an
//! [`EngineEventSink`] stamped with the generation of the binding that
//! subscribed it, so events raised by a torn-down avatar can be recognized
//! and dropped.

use crate::error::BridgeError;
use crate::ingestion::DecodedAudio;
use tokio::sync::mpsc;

/// Callbacks raised by the avatar engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Prepared { cache_id: String },
    PrepareFailed { cache_id: String, error: String },
    SentenceStarted { id: String, text: String, is_first: bool },
    SentenceEnded { id: String, text: String, is_last: bool },
    RequestSent { request_id: String },
    ResponseReceived { cache_id: String },
    SubtitleStarted { text: String },
    SubtitleEnded { text: String },
}

/// An engine event plus the binding generation it was raised under
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Delivery endpoint handed to the engine on subscribe
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event for the bridge; false once the bridge is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Handle returned by [`AvatarEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Options for live chat/speak requests
#[derive(Debug, Clone, PartialEq)]
pub struct TalkOptions {
    pub play_audio: bool,
}

impl Default for TalkOptions {
    fn default() -> Self {
        Self { play_audio: true }
    }
}

/// Audio output of an avatar instance, used by the timeline player
pub trait AudioOutput: Send {
    fn play_clip(&mut self, clip_id: &str, audio: &DecodedAudio);
    fn stop(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
}

/// Speech-and-motion engine bound to one avatar instance
pub trait AvatarEngine: Send {
    /// Send decoded audio for motion generation; returns the cache id
    fn prepare_speech_motion(
        &mut self,
        audio: DecodedAudio,
        text: &str,
        meta: Option<&serde_json::Value>,
    ) -> Result<String, BridgeError>;

    fn play_prepared(&mut self, cache_id: &str, continue_playback: bool, play_audio: bool) -> Result<bool, BridgeError>;

    fn stop(&mut self) -> Result<(), BridgeError>;

    fn set_volume(&mut self, volume: f32) -> Result<(), BridgeError>;

    fn volume(&self) -> f32;

    /// Clear cached payloads; `None` clears everything
    fn clear_cache(&mut self, filter: Option<&str>) -> Result<(), BridgeError>;

    fn cache_count(&self) -> usize;

    fn cached_ids(&self) -> Vec<String>;

    /// Live chat request; returns the request id, `None` when the engine refused
    fn start_chat(&mut self, text: &str, options: &TalkOptions) -> Result<Option<String>, BridgeError>;

    /// Live speak request with optional subtitle override
    fn start_speak(
        &mut self,
        text: &str,
        subtitle: Option<&str>,
        options: &TalkOptions,
    ) -> Result<Option<String>, BridgeError>;

    fn prepare_chat(&mut self, text: &str) -> Result<Option<String>, BridgeError>;

    fn prepare_speak(&mut self, text: &str) -> Result<Option<String>, BridgeError>;

    fn subscribe(&mut self, sink: EngineEventSink) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Audio output of this instance, if it has one
    fn audio_output(&mut self) -> Option<Box<dyn AudioOutput>>;

    fn name(&self) -> &str;
}
