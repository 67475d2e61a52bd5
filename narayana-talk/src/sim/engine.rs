//! In-memory avatar engine and audio output

use super::CallLog;
use crate::engine::{AudioOutput, AvatarEngine, EngineEvent, EngineEventSink, SubscriptionId, TalkOptions};
use crate::error::BridgeError;
use crate::ingestion::DecodedAudio;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct OutputState {
    muted: bool,
    played: Vec<String>,
    stops: usize,
}

/// Audio output that records what it was asked to play
#[derive(Debug, Clone, Default)]
pub struct SimAudioOutput {
    state: Arc<Mutex<OutputState>>,
}

impl SimAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stops
    }
}

impl AudioOutput for SimAudioOutput {
    fn play_clip(&mut self, clip_id: &str, _audio: &DecodedAudio) {
        self.state.lock().played.push(clip_id.to_string());
    }

    fn stop(&mut self) {
        self.state.lock().stops += 1;
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    id: String,
    text: String,
}

#[derive(Debug)]
struct EngineState {
    volume: f32,
    cache: Vec<CachedEntry>,
    subscriptions: BTreeMap<u64, EngineEventSink>,
    revoked: Vec<EngineEventSink>,
    next_subscription: u64,
    queued_ids: VecDeque<String>,
    auto_respond: bool,
    play_result: bool,
    refuse_requests: bool,
    prepare_error: Option<String>,
    stop_error: Option<String>,
    has_audio_output: bool,
    plays: Vec<(String, bool)>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            cache: Vec::new(),
            subscriptions: BTreeMap::new(),
            revoked: Vec::new(),
            next_subscription: 1,
            queued_ids: VecDeque::new(),
            auto_respond: false,
            play_result: true,
            refuse_requests: false,
            prepare_error: None,
            stop_error: None,
            has_audio_output: true,
            plays: Vec::new(),
        }
    }
}

impl EngineState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.queued_ids
            .pop_front()
            .unwrap_or_else(|| format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    fn emit(&self, event: EngineEvent) -> usize {
        self.subscriptions
            .values()
            .filter(|sink| sink.emit(event.clone()))
            .count()
    }

    /// Sentence start/end pair flagged as both first and last
    fn emit_single_sentence(&self, id: &str, text: &str) {
        self.emit(EngineEvent::SentenceStarted {
            id: id.to_string(),
            text: text.to_string(),
            is_first: true,
        });
        self.emit(EngineEvent::SentenceEnded {
            id: id.to_string(),
            text: text.to_string(),
            is_last: true,
        });
    }
}

/// Scriptable avatar engine.
///
/// By default the engine only answers calls; events are raised explicitly
/// with [`SimEngine::emit`]. With auto-respond on, every request raises the
/// event sequence a real engine would (prepared, request sent, sentences).
#[derive(Debug, Clone)]
pub struct SimEngine {
    name: String,
    state: Arc<Mutex<EngineState>>,
    output: SimAudioOutput,
    log: CallLog,
}

impl SimEngine {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(EngineState::default())),
            output: SimAudioOutput::new(),
            log,
        }
    }

    /// Use `id` for the next prepare/request id instead of a generated one
    pub fn queue_id(&self, id: impl Into<String>) {
        self.state.lock().queued_ids.push_back(id.into());
    }

    pub fn set_auto_respond(&self, auto_respond: bool) {
        self.state.lock().auto_respond = auto_respond;
    }

    /// Result returned by `play_prepared`
    pub fn set_play_result(&self, result: bool) {
        self.state.lock().play_result = result;
    }

    /// Make live and prepare-by-text requests return no id
    pub fn set_refuse_requests(&self, refuse: bool) {
        self.state.lock().refuse_requests = refuse;
    }

    /// Make `prepare_speech_motion` fail with this message
    pub fn set_prepare_error(&self, error: Option<String>) {
        self.state.lock().prepare_error = error;
    }

    /// Make `stop` fail with `error`
    pub fn set_stop_error(&self, error: Option<String>) {
        self.state.lock().stop_error = error;
    }

    pub fn set_has_audio_output(&self, has_output: bool) {
        self.state.lock().has_audio_output = has_output;
    }

    /// Put an entry in the engine cache directly
    pub fn insert_cached(&self, id: impl Into<String>) {
        self.state.lock().cache.push(CachedEntry {
            id: id.into(),
            text: String::new(),
        });
    }

    /// Raise an event to current subscribers; returns how many received it
    pub fn emit(&self, event: EngineEvent) -> usize {
        self.state.lock().emit(event)
    }

    /// Raise an event through subscriptions that were already revoked, the
    /// way a late callback from a torn-down avatar would arrive
    pub fn emit_late(&self, event: EngineEvent) -> usize {
        self.state
            .lock()
            .revoked
            .iter()
            .filter(|sink| sink.emit(event.clone()))
            .count()
    }

    /// Raise the sentence events of a playback of `sentences` for `id`
    pub fn speak_sentences(&self, id: &str, sentences: &[&str]) {
        let state = self.state.lock();
        let last = sentences.len().saturating_sub(1);
        for (i, text) in sentences.iter().enumerate() {
            state.emit(EngineEvent::SentenceStarted {
                id: id.to_string(),
                text: text.to_string(),
                is_first: i == 0,
            });
            state.emit(EngineEvent::SentenceEnded {
                id: id.to_string(),
                text: text.to_string(),
                is_last: i == last,
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.state.lock().revoked.len()
    }

    /// Every `play_prepared` call as `(cache_id, play_audio)`
    pub fn plays(&self) -> Vec<(String, bool)> {
        self.state.lock().plays.clone()
    }

    pub fn output(&self) -> SimAudioOutput {
        self.output.clone()
    }

    fn record(&self, entry: String) {
        debug!("{}: {}", self.name, entry);
        self.log.record(format!("{}.{}", self.name, entry));
    }
}

impl AvatarEngine for SimEngine {
    fn prepare_speech_motion(
        &mut self,
        audio: DecodedAudio,
        text: &str,
        _meta: Option<&serde_json::Value>,
    ) -> Result<String, BridgeError> {
        self.record(format!("prepare_speech_motion {:.2}s", audio.duration_secs));
        let mut state = self.state.lock();
        if let Some(ref error) = state.prepare_error {
            return Err(BridgeError::Engine(error.clone()));
        }
        let id = state.next_id("cache");
        state.cache.push(CachedEntry {
            id: id.clone(),
            text: text.to_string(),
        });
        if state.auto_respond {
            state.emit(EngineEvent::Prepared { cache_id: id.clone() });
        }
        Ok(id)
    }

    fn play_prepared(&mut self, cache_id: &str, continue_playback: bool, play_audio: bool) -> Result<bool, BridgeError> {
        self.record(format!("play_prepared {} continue={}", cache_id, continue_playback));
        let mut state = self.state.lock();
        state.plays.push((cache_id.to_string(), play_audio));
        if !state.play_result {
            return Ok(false);
        }
        if state.auto_respond {
            let text = state
                .cache
                .iter()
                .find(|e| e.id == cache_id)
                .map(|e| e.text.clone())
                .unwrap_or_default();
            state.emit_single_sentence(cache_id, &text);
        }
        Ok(true)
    }

    fn stop(&mut self) -> Result<(), BridgeError> {
        self.record("stop".to_string());
        match self.state.lock().stop_error {
            Some(ref error) => Err(BridgeError::Engine(error.clone())),
            None => Ok(()),
        }
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), BridgeError> {
        self.record(format!("set_volume {}", volume));
        self.state.lock().volume = volume;
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn clear_cache(&mut self, filter: Option<&str>) -> Result<(), BridgeError> {
        self.record(format!("clear_cache {}", filter.unwrap_or("*")));
        let mut state = self.state.lock();
        match filter {
            Some(filter) => state.cache.retain(|e| !e.id.contains(filter)),
            None => state.cache.clear(),
        }
        Ok(())
    }

    fn cache_count(&self) -> usize {
        self.state.lock().cache.len()
    }

    fn cached_ids(&self) -> Vec<String> {
        self.state.lock().cache.iter().map(|e| e.id.clone()).collect()
    }

    fn start_chat(&mut self, text: &str, options: &TalkOptions) -> Result<Option<String>, BridgeError> {
        self.record(format!("start_chat play_audio={}", options.play_audio));
        Ok(self.start_live(text, None))
    }

    fn start_speak(
        &mut self,
        text: &str,
        subtitle: Option<&str>,
        options: &TalkOptions,
    ) -> Result<Option<String>, BridgeError> {
        self.record(format!("start_speak play_audio={}", options.play_audio));
        Ok(self.start_live(text, subtitle))
    }

    fn prepare_chat(&mut self, text: &str) -> Result<Option<String>, BridgeError> {
        self.record("prepare_chat".to_string());
        Ok(self.prepare_text(text))
    }

    fn prepare_speak(&mut self, text: &str) -> Result<Option<String>, BridgeError> {
        self.record("prepare_speak".to_string());
        Ok(self.prepare_text(text))
    }

    fn subscribe(&mut self, sink: EngineEventSink) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions.insert(id, sink);
        drop(state);
        self.record(format!("subscribe {}", id));
        SubscriptionId(id)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        let mut state = self.state.lock();
        if let Some(sink) = state.subscriptions.remove(&subscription.0) {
            state.revoked.push(sink);
        }
        drop(state);
        self.record(format!("unsubscribe {}", subscription.0));
    }

    fn audio_output(&mut self) -> Option<Box<dyn AudioOutput>> {
        if self.state.lock().has_audio_output {
            Some(Box::new(self.output.clone()))
        } else {
            None
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl SimEngine {
    fn start_live(&self, text: &str, subtitle: Option<&str>) -> Option<String> {
        let mut state = self.state.lock();
        if state.refuse_requests {
            return None;
        }
        let id = state.next_id("req");
        if state.auto_respond {
            let subtitle = subtitle.unwrap_or(text);
            state.emit(EngineEvent::RequestSent { request_id: id.clone() });
            state.emit(EngineEvent::ResponseReceived { cache_id: id.clone() });
            state.emit(EngineEvent::SentenceStarted {
                id: id.clone(),
                text: text.to_string(),
                is_first: true,
            });
            state.emit(EngineEvent::SubtitleStarted {
                text: subtitle.to_string(),
            });
            state.emit(EngineEvent::SubtitleEnded {
                text: subtitle.to_string(),
            });
            state.emit(EngineEvent::SentenceEnded {
                id: id.clone(),
                text: text.to_string(),
                is_last: true,
            });
        }
        Some(id)
    }

    fn prepare_text(&self, text: &str) -> Option<String> {
        let mut state = self.state.lock();
        if state.refuse_requests {
            return None;
        }
        let id = state.next_id("cache");
        state.cache.push(CachedEntry {
            id: id.clone(),
            text: text.to_string(),
        });
        if state.auto_respond {
            state.emit(EngineEvent::Prepared { cache_id: id.clone() });
        }
        Some(id)
    }
}
