//! Host notification surface
//!
//! Internal code raises strongly typed [`HostEvent`]s. [`HostEvent::to_wire`]
//! is the only place that knows the host's string-only callback format.

use crate::error::BridgeError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Payload of `OnCacheInfo`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub count: usize,
    pub ids: Vec<String>,
}

/// Payload of `OnAvatarChanged`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarChanged {
    pub avatar_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Payload of `OnAvatarList`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarList {
    pub avatar_ids: Vec<String>,
    pub current_avatar_id: Option<String>,
}

/// Notifications delivered to the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    BridgeReady,
    Prepared { id: String },
    PrepareFailed { id: String, error: String },
    PlaybackStarted { id: String },
    PlaybackCompleted { id: String },
    SentenceStarted { text: String },
    SentenceEnded { text: String },
    SubtitleStarted { text: String },
    SubtitleEnded { text: String },
    RequestSent { id: String },
    ResponseReceived { id: String },
    VolumeChanged { volume: f32 },
    CacheInfo(CacheInfo),
    AvatarChanged(AvatarChanged),
    AvatarList(AvatarList),
    Error { method: String, message: String },
}

/// One host callback invocation: a fixed method name and string arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl HostEvent {
    /// Host callback name
    pub fn method_name(&self) -> &'static str {
        match self {
            HostEvent::BridgeReady => "OnBridgeReady",
            HostEvent::Prepared { .. } => "OnPrepared",
            HostEvent::PrepareFailed { .. } => "OnPrepareFailed",
            HostEvent::PlaybackStarted { .. } => "OnPlaybackStarted",
            HostEvent::PlaybackCompleted { .. } => "OnPlaybackCompleted",
            HostEvent::SentenceStarted { .. } => "OnSentenceStarted",
            HostEvent::SentenceEnded { .. } => "OnSentenceEnded",
            HostEvent::SubtitleStarted { .. } => "OnSubtitleStarted",
            HostEvent::SubtitleEnded { .. } => "OnSubtitleEnded",
            HostEvent::RequestSent { .. } => "OnRequestSent",
            HostEvent::ResponseReceived { .. } => "OnResponseReceived",
            HostEvent::VolumeChanged { .. } => "OnVolumeChanged",
            HostEvent::CacheInfo(_) => "OnCacheInfo",
            HostEvent::AvatarChanged(_) => "OnAvatarChanged",
            HostEvent::AvatarList(_) => "OnAvatarList",
            HostEvent::Error { .. } => "OnError",
        }
    }

    /// Serialize into the host's string-only callback format
    pub fn to_wire(&self) -> Result<WireMessage, BridgeError> {
        let args = match self {
            HostEvent::BridgeReady => Vec::new(),
            HostEvent::Prepared { id }
            | HostEvent::PlaybackStarted { id }
            | HostEvent::PlaybackCompleted { id }
            | HostEvent::RequestSent { id }
            | HostEvent::ResponseReceived { id } => vec![id.clone()],
            HostEvent::PrepareFailed { id, error } => vec![id.clone(), error.clone()],
            HostEvent::SentenceStarted { text }
            | HostEvent::SentenceEnded { text }
            | HostEvent::SubtitleStarted { text }
            | HostEvent::SubtitleEnded { text } => vec![text.clone()],
            HostEvent::VolumeChanged { volume } => vec![volume.to_string()],
            HostEvent::CacheInfo(info) => vec![serde_json::to_string(info)?],
            HostEvent::AvatarChanged(changed) => vec![serde_json::to_string(changed)?],
            HostEvent::AvatarList(list) => vec![serde_json::to_string(list)?],
            HostEvent::Error { method, message } => vec![method.clone(), message.clone()],
        };
        Ok(WireMessage {
            method: self.method_name(),
            args,
        })
    }
}

/// Receiver of host notifications (the native callback boundary)
pub trait HostCallbacks: Send + Sync {
    fn deliver(&self, message: WireMessage);
}

/// Serializes typed events and hands them to the host
pub struct EventEmitter {
    host: Arc<dyn HostCallbacks>,
    verbose: bool,
}

impl EventEmitter {
    pub fn new(host: Arc<dyn HostCallbacks>, verbose: bool) -> Self {
        Self { host, verbose }
    }

    pub fn emit(&self, event: HostEvent) {
        match event.to_wire() {
            Ok(message) => {
                if self.verbose {
                    debug!("-> {} {:?}", message.method, message.args);
                }
                self.host.deliver(message);
            }
            Err(e) => error!("Failed to serialize {}: {}", event.method_name(), e),
        }
    }

    /// Report a failed command as `OnError(method, message)`
    pub fn error(&self, method: &str, err: &BridgeError) {
        warn!("{}: {}", method, err);
        self.emit(HostEvent::Error {
            method: method.to_string(),
            message: err.detail(),
        });
    }
}
