//! Bridge controller: host commands in, host notifications out
//!
//! The host calls [`Bridge::handle`] once per command and [`Bridge::update`]
//! once per tick of its update loop. Everything runs on the caller's thread;
//! asynchronous work (decodes, engine round-trips) is re-checked on each
//! `update` and never blocks it.

use crate::command::{
    Command, PlayRequest, PlayTimelineRequest, PrepareAudioRequest, TalkKind, TalkRequest,
    TimelineAudioRequest,
};
use crate::config::BridgeConfig;
use crate::correlator::{CacheCorrelator, PreparedAction};
use crate::emitter::{AvatarChanged, AvatarList, CacheInfo, EventEmitter, HostCallbacks, HostEvent};
use crate::engine::{AvatarEngine, EngineEvent, TaggedEvent, TalkOptions};
use crate::error::BridgeError;
use crate::ingestion::{AudioDecoder, AudioFormat, CompletedDecode, DecodePurpose, IngestionPipeline};
use crate::lifecycle::{AvatarCatalog, AvatarLifecycle, SwapOutcome};
use crate::scene::{AvatarScene, Background};
use crate::timeline::{TimelineDocument, TimelineEvent, TimelinePlayer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Phase of the live (engine-driven) playback track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Live request issued; waiting for the engine to send it
    RequestSent,
    /// Response arrived; playback is pending until the first-sentence event
    ResponseReceived,
    /// `OnPlaybackStarted` delivered
    Playing,
    /// Last sentence ended; completion fires when the countdown reaches zero
    Completing { ticks_left: u32 },
}

#[derive(Debug, Clone)]
struct LiveSession {
    id: String,
    phase: PlaybackPhase,
}

impl LiveSession {
    fn awaiting_start(&self) -> bool {
        matches!(self.phase, PlaybackPhase::RequestSent | PlaybackPhase::ResponseReceived)
    }
}

/// Orchestrates the avatar engine on behalf of the host
pub struct Bridge {
    config: BridgeConfig,
    emitter: EventEmitter,
    lifecycle: AvatarLifecycle,
    ingestion: IngestionPipeline,
    correlator: CacheCorrelator,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    live: Option<LiveSession>,
    timeline_id: Option<String>,
    ready: bool,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        scene: Box<dyn AvatarScene>,
        decoder: Arc<dyn AudioDecoder>,
        host: Arc<dyn HostCallbacks>,
    ) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::Config)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let catalog = AvatarCatalog::new(config.avatars.clone());
        Ok(Self {
            emitter: EventEmitter::new(host, config.enable_logging),
            lifecycle: AvatarLifecycle::new(scene, catalog, events_tx),
            ingestion: IngestionPipeline::new(decoder, config.decode_budget_ticks),
            correlator: CacheCorrelator::new(),
            events_rx,
            live: None,
            timeline_id: None,
            ready: false,
            config,
        })
    }

    /// Bind the startup avatar and announce readiness
    pub fn start(&mut self) {
        match self.lifecycle.bind_initial(self.config.initial_avatar.as_deref()) {
            Ok(()) => {
                self.ready = true;
                self.emitter.emit(HostEvent::BridgeReady);
                info!("Bridge ready");
            }
            Err(e) => self.emitter.error("Start", &e),
        }
    }

    /// Revoke engine subscriptions and stop both playback tracks
    pub fn shutdown(&mut self) {
        if !self.ready {
            return;
        }
        self.ready = false;
        self.lifecycle.shutdown();
        if let Some(binding) = self.lifecycle.binding_mut() {
            if let Err(e) = binding.engine_mut().stop() {
                warn!("Failed to stop engine on shutdown: {}", e);
            }
        }
        self.ingestion.cancel_all();
        self.live = None;
        self.timeline_id = None;
        info!("Bridge shut down");
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn current_playing_id(&self) -> Option<&str> {
        self.live.as_ref().map(|s| s.id.as_str())
    }

    pub fn playback_phase(&self) -> Option<PlaybackPhase> {
        self.live.as_ref().map(|s| s.phase)
    }

    pub fn current_timeline_id(&self) -> Option<&str> {
        self.timeline_id.as_deref()
    }

    pub fn current_avatar_id(&self) -> Option<&str> {
        self.lifecycle.current_avatar_id()
    }

    pub fn generation(&self) -> Option<u64> {
        self.lifecycle.generation()
    }

    pub fn volume(&self) -> Option<f32> {
        self.lifecycle.binding().map(|b| b.engine().volume())
    }

    pub fn decodes_in_flight(&self) -> usize {
        self.ingestion.in_flight()
    }

    /// Handle one host call. Failures are reported as `OnError(method, message)`.
    pub fn handle(&mut self, method: &str, payload: &str) {
        if self.config.enable_logging {
            debug!("<- {} {}", method, payload);
        }

        let result = Command::parse(method, payload).and_then(|command| self.dispatch(command));
        if let Err(e) = result {
            self.emitter.error(method, &e);
        }
    }

    /// Advance one tick
    pub fn update(&mut self, delta_secs: f64) {
        self.advance_completion();
        self.drain_engine_events();
        self.process_decodes();
        self.advance_timeline(delta_secs);
    }

    fn dispatch(&mut self, command: Command) -> Result<(), BridgeError> {
        match command {
            Command::PrepareAudio(request) => self.prepare_audio(request),
            Command::Play(request) => self.play(request),
            Command::Stop => self.stop(),
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::GetCacheInfo => self.emit_cache_info(),
            Command::ClearCache => {
                self.engine()?.clear_cache(None)?;
                info!("All cache cleared");
                self.emit_cache_info()
            }
            Command::ChangeAvatar(avatar_id) => {
                self.change_avatar(avatar_id);
                Ok(())
            }
            Command::GetAvatarList => {
                self.emitter.emit(HostEvent::AvatarList(AvatarList {
                    avatar_ids: self.lifecycle.catalog().ids(),
                    current_avatar_id: self.lifecycle.current_avatar_id().map(str::to_string),
                }));
                Ok(())
            }
            Command::SetBackgroundColor(background) => self.set_background(background),
            Command::Talk(kind, request) => self.talk(kind, request),
            Command::LoadTimeline(document) => self.load_timeline(document),
            Command::LoadTimelineAudio(request) => self.load_timeline_audio(request),
            Command::PlayTimeline(request) => self.play_timeline(request),
        }
    }

    fn engine(&mut self) -> Result<&mut dyn AvatarEngine, BridgeError> {
        self.lifecycle
            .binding_mut()
            .map(|b| b.engine_mut())
            .ok_or_else(|| BridgeError::Engine("Avatar engine not available".to_string()))
    }

    fn timeline(&mut self) -> Result<&mut TimelinePlayer, BridgeError> {
        self.lifecycle
            .binding_mut()
            .and_then(|b| b.timeline_mut())
            .ok_or_else(|| BridgeError::Timeline("Timeline player not initialized".to_string()))
    }

    fn audio_format(&self, requested: Option<&str>) -> AudioFormat {
        AudioFormat::from_name(requested.unwrap_or(&self.config.default_audio_format))
    }

    fn prepare_audio(&mut self, request: PrepareAudioRequest) -> Result<(), BridgeError> {
        let format = self.audio_format(request.format.as_deref());
        self.ingestion
            .begin(DecodePurpose::Prepare { text: request.text }, format)?;
        if self.config.enable_logging {
            info!("PrepareAudio: decoding pending audio, format={}", format.as_str());
        }
        Ok(())
    }

    fn play(&mut self, request: PlayRequest) -> Result<(), BridgeError> {
        let played = self
            .engine()?
            .play_prepared(&request.cache_id, false, request.play_audio)?;
        if !played {
            return Err(BridgeError::Engine(format!(
                "PlayPrepared failed for cacheId: {}",
                request.cache_id
            )));
        }
        self.begin_live_playback(request.cache_id);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BridgeError> {
        if let Some(session) = self.live.take() {
            debug!("Stopped tracking {}", session.id);
        }
        self.stop_timeline();
        match self.lifecycle.binding_mut() {
            Some(binding) => binding.engine_mut().stop(),
            None => Ok(()),
        }
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), BridgeError> {
        let volume = volume.clamp(0.0, 1.0);
        self.engine()?.set_volume(volume)?;
        self.emitter.emit(HostEvent::VolumeChanged { volume });
        Ok(())
    }

    fn emit_cache_info(&mut self) -> Result<(), BridgeError> {
        let engine = self.engine()?;
        let info = CacheInfo {
            count: engine.cache_count(),
            ids: engine.cached_ids(),
        };
        self.emitter.emit(HostEvent::CacheInfo(info));
        Ok(())
    }

    fn change_avatar(&mut self, avatar_id: String) {
        let retiring = self.lifecycle.generation();
        let result = self.lifecycle.change_avatar(&avatar_id);

        let torn_down = match result {
            Ok(SwapOutcome::Swapped) => true,
            Ok(SwapOutcome::AlreadyActive) => false,
            Err(ref failure) => failure.torn_down,
        };
        if torn_down {
            self.live = None;
            self.timeline_id = None;
            if let Some(generation) = retiring {
                for cache_id in self.correlator.retire_generation(generation) {
                    self.emitter.emit(HostEvent::PrepareFailed {
                        id: cache_id,
                        error: "Avatar changed before prepare completed".to_string(),
                    });
                }
            }
        }

        let changed = match result {
            Ok(_) => AvatarChanged {
                avatar_id,
                success: true,
                error: None,
            },
            Err(failure) => {
                warn!("ChangeAvatar {} failed: {}", avatar_id, failure.error);
                AvatarChanged {
                    avatar_id,
                    success: false,
                    error: Some(failure.error.detail()),
                }
            }
        };
        self.emitter.emit(HostEvent::AvatarChanged(changed));
    }

    fn set_background(&mut self, background: Background) -> Result<(), BridgeError> {
        self.lifecycle.set_background(background)?;
        if self.config.enable_logging {
            info!("Background set to {:?}", background);
        }
        Ok(())
    }

    fn talk(&mut self, kind: TalkKind, request: TalkRequest) -> Result<(), BridgeError> {
        let method = match kind {
            TalkKind::Chat => "Chat",
            TalkKind::Speak => "Speak",
        };
        let generation = self
            .lifecycle
            .generation()
            .ok_or_else(|| BridgeError::Engine("Avatar engine not available".to_string()))?;

        if request.prepare_only || !request.stream {
            let engine = self.engine()?;
            let cache_id = match kind {
                TalkKind::Chat => engine.prepare_chat(&request.text)?,
                TalkKind::Speak => engine.prepare_speak(&request.text)?,
            }
            .ok_or_else(|| BridgeError::Engine(format!("{} returned no cache id", method)))?;

            self.correlator.track_prepare(&cache_id, method, generation);
            if !request.prepare_only {
                self.correlator.register_autoplay(&cache_id, request.play_audio);
            }
            if self.config.enable_logging {
                info!(
                    "{}: preparing {} (autoplay={})",
                    method, cache_id, !request.prepare_only
                );
            }
            return Ok(());
        }

        let options = TalkOptions {
            play_audio: request.play_audio,
        };
        let engine = self.engine()?;
        let request_id = match kind {
            TalkKind::Chat => engine.start_chat(&request.text, &options)?,
            TalkKind::Speak => engine.start_speak(&request.text, request.subtitle.as_deref(), &options)?,
        }
        .ok_or_else(|| BridgeError::Engine(format!("{} returned no request id", method)))?;

        self.stop_timeline();
        if self.config.enable_logging {
            info!("{}: live request {}", method, request_id);
        }
        self.live = Some(LiveSession {
            id: request_id,
            phase: PlaybackPhase::RequestSent,
        });
        Ok(())
    }

    fn load_timeline(&mut self, document: TimelineDocument) -> Result<(), BridgeError> {
        let player = self.timeline()?;
        player.load(document);
        if self.timeline_id.take().is_some() {
            debug!("Timeline reloaded while playing");
        }
        Ok(())
    }

    fn load_timeline_audio(&mut self, request: TimelineAudioRequest) -> Result<(), BridgeError> {
        self.timeline()?;
        let format = self.audio_format(request.format.as_deref());
        self.ingestion.begin(
            DecodePurpose::TimelineClip {
                clip_id: request.clip_id,
            },
            format,
        )
    }

    fn play_timeline(&mut self, request: PlayTimelineRequest) -> Result<(), BridgeError> {
        let player = self.timeline()?;
        player.play(request.play_audio)?;
        let timeline_id = request
            .cache_id
            .or_else(|| player.document_id().map(str::to_string))
            .unwrap_or_else(|| "timeline".to_string());

        if self.live.is_some() {
            if let Err(e) = self.engine()?.stop() {
                self.stop_timeline();
                return Err(e);
            }
            self.live = None;
        }
        self.timeline_id = Some(timeline_id.clone());
        self.emitter.emit(HostEvent::PlaybackStarted { id: timeline_id });
        Ok(())
    }

    /// Live playback of `id` has started: it becomes the current id and the
    /// timeline track yields
    fn begin_live_playback(&mut self, id: String) {
        self.stop_timeline();
        self.live = Some(LiveSession {
            id: id.clone(),
            phase: PlaybackPhase::Playing,
        });
        self.emitter.emit(HostEvent::PlaybackStarted { id });
    }

    fn stop_timeline(&mut self) {
        if let Some(player) = self.lifecycle.binding_mut().and_then(|b| b.timeline_mut()) {
            player.stop();
        }
        self.timeline_id = None;
    }

    fn advance_completion(&mut self) {
        let finished = match self.live {
            Some(LiveSession {
                phase: PlaybackPhase::Completing { ref mut ticks_left },
                ..
            }) => {
                *ticks_left = ticks_left.saturating_sub(1);
                *ticks_left == 0
            }
            _ => false,
        };
        if finished {
            self.complete_live();
        }
    }

    fn complete_live(&mut self) {
        if let Some(session) = self.live.take() {
            if self.config.enable_logging {
                info!("Playback completed: {}", session.id);
            }
            self.emitter.emit(HostEvent::PlaybackCompleted { id: session.id });
        }
    }

    fn drain_engine_events(&mut self) {
        while let Ok(tagged) = self.events_rx.try_recv() {
            if self.lifecycle.generation() != Some(tagged.generation) {
                debug!(
                    "Dropping stale event from generation {}: {:?}",
                    tagged.generation, tagged.event
                );
                continue;
            }
            self.on_engine_event(tagged.event);
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Prepared { cache_id } => {
                let action = self.correlator.on_prepared(&cache_id);
                self.emitter.emit(HostEvent::Prepared { id: cache_id.clone() });
                if let PreparedAction::AutoPlay { play_audio } = action {
                    self.autoplay(cache_id, play_audio);
                }
            }
            EngineEvent::PrepareFailed { cache_id, error } => {
                self.correlator.on_prepare_failed(&cache_id);
                self.emitter.emit(HostEvent::PrepareFailed { id: cache_id, error });
            }
            EngineEvent::SentenceStarted { id, text, is_first } => {
                if is_first {
                    self.mark_playback_started(&id);
                }
                self.emitter.emit(HostEvent::SentenceStarted { text });
            }
            EngineEvent::SentenceEnded { id, text, is_last } => {
                if is_last {
                    // A last sentence with no first-sentence event still starts playback
                    self.mark_playback_started(&id);
                }
                self.emitter.emit(HostEvent::SentenceEnded { text });
                if is_last {
                    self.schedule_completion(&id);
                }
            }
            EngineEvent::RequestSent { request_id } => {
                self.emitter.emit(HostEvent::RequestSent { id: request_id });
            }
            EngineEvent::ResponseReceived { cache_id } => {
                if let Some(ref mut session) = self.live {
                    if session.id == cache_id && session.phase == PlaybackPhase::RequestSent {
                        session.phase = PlaybackPhase::ResponseReceived;
                    }
                }
                self.emitter.emit(HostEvent::ResponseReceived { id: cache_id });
            }
            EngineEvent::SubtitleStarted { text } => {
                self.emitter.emit(HostEvent::SubtitleStarted { text });
            }
            EngineEvent::SubtitleEnded { text } => {
                self.emitter.emit(HostEvent::SubtitleEnded { text });
            }
        }
    }

    /// Move a pending live request to `Playing` and announce it once
    fn mark_playback_started(&mut self, id: &str) {
        match self.live {
            Some(ref mut session) if session.id == id && session.awaiting_start() => {
                session.phase = PlaybackPhase::Playing;
            }
            _ => return,
        }
        self.emitter.emit(HostEvent::PlaybackStarted { id: id.to_string() });
    }

    /// Defer completion of the current live id; ids no longer current are ignored
    fn schedule_completion(&mut self, id: &str) {
        let delay = self.config.completion_delay_ticks;
        match self.live {
            Some(ref mut session) if session.id == id => {
                if matches!(session.phase, PlaybackPhase::Completing { .. }) {
                    return;
                }
                session.phase = PlaybackPhase::Completing { ticks_left: delay };
            }
            _ => {
                debug!("Ignoring end of {} (not the current playback)", id);
                return;
            }
        }
        if delay == 0 {
            self.complete_live();
        }
    }

    fn autoplay(&mut self, cache_id: String, play_audio: bool) {
        let result = self
            .engine()
            .and_then(|engine| engine.play_prepared(&cache_id, false, play_audio));
        match result {
            Ok(true) => self.begin_live_playback(cache_id),
            Ok(false) => self.emitter.error(
                "Play",
                &BridgeError::Engine(format!("PlayPrepared failed for cacheId: {}", cache_id)),
            ),
            Err(e) => self.emitter.error("Play", &e),
        }
    }

    fn process_decodes(&mut self) {
        for completed in self.ingestion.poll() {
            let method = completed.purpose.method();
            if let Err(e) = self.finish_decode(completed) {
                self.emitter.error(method, &e);
            }
        }
    }

    fn finish_decode(&mut self, completed: CompletedDecode) -> Result<(), BridgeError> {
        let audio = completed.outcome.into_result()?;
        match completed.purpose {
            DecodePurpose::Prepare { text } => {
                let generation = self
                    .lifecycle
                    .generation()
                    .ok_or_else(|| BridgeError::Engine("Avatar engine not available".to_string()))?;
                let cache_id = self
                    .engine()?
                    .prepare_speech_motion(audio, &text, None)
                    .map_err(|e| BridgeError::Engine(format!("PrepareSpeechMotion failed: {}", e.detail())))?;
                self.correlator.track_prepare(&cache_id, "PrepareAudio", generation);
                if self.config.enable_logging {
                    info!("PrepareAudio: PrepareSpeechMotion called, cacheId={}", cache_id);
                }
                Ok(())
            }
            DecodePurpose::TimelineClip { clip_id } => {
                self.timeline()?.register_clip(&clip_id, audio)?;
                self.emitter.emit(HostEvent::Prepared { id: clip_id });
                Ok(())
            }
        }
    }

    fn advance_timeline(&mut self, delta_secs: f64) {
        let events = match self.lifecycle.binding_mut().and_then(|b| b.timeline_mut()) {
            Some(player) => player.advance(delta_secs),
            None => return,
        };

        for event in events {
            match event {
                TimelineEvent::SentenceStarted(text) => self.emitter.emit(HostEvent::SentenceStarted { text }),
                TimelineEvent::SentenceEnded(text) => self.emitter.emit(HostEvent::SentenceEnded { text }),
                TimelineEvent::SubtitleStarted(text) => self.emitter.emit(HostEvent::SubtitleStarted { text }),
                TimelineEvent::SubtitleEnded(text) => self.emitter.emit(HostEvent::SubtitleEnded { text }),
                TimelineEvent::ClipStarted(clip_id) => debug!("Timeline clip started: {}", clip_id),
                TimelineEvent::Completed => {
                    if let Some(id) = self.timeline_id.take() {
                        self.emitter.emit(HostEvent::PlaybackCompleted { id });
                    }
                }
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
