//! Host commands and their payloads

use crate::error::BridgeError;
use crate::scene::Background;
use crate::timeline::TimelineDocument;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// `PrepareAudio` payload: `{ "format": "wav", "text": "" }`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrepareAudioRequest {
    pub format: Option<String>,
    /// Subtitle text passed to the engine with the audio
    pub text: String,
}

/// `Play` payload: `{ "cacheId": "xxx", "playAudio": true }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayRequest {
    pub cache_id: String,
    pub play_audio: bool,
}

impl Default for PlayRequest {
    fn default() -> Self {
        Self {
            cache_id: String::new(),
            play_audio: true,
        }
    }
}

/// `Chat` / `Speak` payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TalkRequest {
    pub text: String,
    /// Cache only; the host plays it later with `Play`
    pub prepare_only: bool,
    pub play_audio: bool,
    /// Live streaming request (true) or prepare-then-autoplay (false)
    pub stream: bool,
    pub subtitle: Option<String>,
}

impl Default for TalkRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            prepare_only: false,
            play_audio: true,
            stream: true,
            subtitle: None,
        }
    }
}

/// `LoadTimelineAudio` payload: `{ "clipId": "intro", "format": "wav" }`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimelineAudioRequest {
    pub clip_id: String,
    pub format: Option<String>,
}

/// `PlayTimeline` payload: `{ "cacheId": "lesson-1", "playAudio": true }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayTimelineRequest {
    pub cache_id: Option<String>,
    pub play_audio: bool,
}

impl Default for PlayTimelineRequest {
    fn default() -> Self {
        Self {
            cache_id: None,
            play_audio: true,
        }
    }
}

/// Which live request API a talk command uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkKind {
    Chat,
    Speak,
}

/// A parsed host command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PrepareAudio(PrepareAudioRequest),
    Play(PlayRequest),
    Stop,
    SetVolume(f32),
    GetCacheInfo,
    ClearCache,
    ChangeAvatar(String),
    GetAvatarList,
    SetBackgroundColor(Background),
    Talk(TalkKind, TalkRequest),
    LoadTimeline(TimelineDocument),
    LoadTimelineAudio(TimelineAudioRequest),
    PlayTimeline(PlayTimelineRequest),
}

impl Command {
    /// Parse a host call. Fails without side effects on unknown methods or
    /// malformed payloads.
    pub fn parse(method: &str, payload: &str) -> Result<Self, BridgeError> {
        let command = match method {
            "PrepareAudio" => Command::PrepareAudio(object_payload(payload)?),
            "Play" => {
                let request: PlayRequest = object_payload(payload)?;
                if request.cache_id.is_empty() {
                    return Err(BridgeError::Validation("No cacheId provided".to_string()));
                }
                Command::Play(request)
            }
            "Stop" => Command::Stop,
            "SetVolume" => {
                let raw = scalar_payload(payload, "volume")?;
                let volume = raw
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| BridgeError::Validation(format!("Invalid volume value: {}", raw)))?;
                Command::SetVolume(volume)
            }
            "GetCacheInfo" => Command::GetCacheInfo,
            "ClearCache" | "ClearAllCache" => Command::ClearCache,
            "ChangeAvatar" => {
                let avatar_id = scalar_payload(payload, "avatarId")?;
                let avatar_id = avatar_id.trim();
                if avatar_id.is_empty() {
                    return Err(BridgeError::Validation("No avatarId provided".to_string()));
                }
                Command::ChangeAvatar(avatar_id.to_string())
            }
            "GetAvatarList" => Command::GetAvatarList,
            "SetBackgroundColor" => {
                let raw = scalar_payload(payload, "color")?;
                let background = Background::parse(&raw)
                    .ok_or_else(|| BridgeError::Validation(format!("Invalid color value: {}", raw)))?;
                Command::SetBackgroundColor(background)
            }
            "Chat" | "Speak" => {
                let request: TalkRequest = object_payload(payload)?;
                if request.text.trim().is_empty() {
                    return Err(BridgeError::Validation("No text provided".to_string()));
                }
                let kind = if method == "Chat" { TalkKind::Chat } else { TalkKind::Speak };
                Command::Talk(kind, request)
            }
            "LoadTimeline" => Command::LoadTimeline(TimelineDocument::parse(payload)?),
            "LoadTimelineAudio" => {
                let request: TimelineAudioRequest = object_payload(payload)?;
                if request.clip_id.trim().is_empty() {
                    return Err(BridgeError::Validation("No clipId provided".to_string()));
                }
                Command::LoadTimelineAudio(request)
            }
            "PlayTimeline" => Command::PlayTimeline(object_payload(payload)?),
            _ => return Err(BridgeError::Validation("Unknown method".to_string())),
        };
        Ok(command)
    }
}

/// JSON object payload; an empty payload means all defaults
fn object_payload<T: DeserializeOwned + Default>(payload: &str) -> Result<T, BridgeError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(payload)?)
}

/// Single-value payload given as a bare string, a JSON string or number, or
/// an object carrying `field`
fn scalar_payload(payload: &str, field: &str) -> Result<String, BridgeError> {
    let trimmed = payload.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => Ok(s),
        Ok(Value::Number(n)) => Ok(n.to_string()),
        Ok(Value::Object(map)) => match map.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(BridgeError::Validation(format!("Missing '{}' field", field))),
        },
        _ => Ok(trimmed.to_string()),
    }
}
