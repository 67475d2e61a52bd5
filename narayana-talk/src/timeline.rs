//! Timeline playback: pre-timed sentence/subtitle cues and audio clips
//!
//! A [`TimelineDocument`] is loaded once and played independently of live
//! engine requests. [`TimelinePlayer::advance`] is called once per tick and
//! returns the cues whose time has been reached, always in document time
//! order (cues sharing a timestamp keep their document order).

use crate::engine::AudioOutput;
use crate::error::BridgeError;
use crate::ingestion::DecodedAudio;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Kind of a timed cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CueKind {
    SentenceStart,
    SentenceEnd,
    SubtitleStart,
    SubtitleEnd,
}

/// One timed cue
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineCue {
    pub time: f64,
    #[serde(rename = "type")]
    pub kind: CueKind,
    #[serde(default)]
    pub text: String,
}

/// Named audio clip placed on the timeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipReference {
    pub clip_id: String,
    #[serde(default)]
    pub time: f64,
}

/// Pre-authored sequence of timed cues
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub cues: Vec<TimelineCue>,
    #[serde(default)]
    pub audio: Vec<ClipReference>,
}

impl TimelineDocument {
    /// Parse and normalize a document: validates times and orders cues by time
    pub fn parse(json: &str) -> Result<Self, BridgeError> {
        let mut document: TimelineDocument = serde_json::from_str(json)?;
        document.normalize()?;
        Ok(document)
    }

    fn normalize(&mut self) -> Result<(), BridgeError> {
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(BridgeError::Validation(format!("Invalid timeline duration: {}", duration)));
            }
        }
        for cue in &self.cues {
            if !cue.time.is_finite() || cue.time < 0.0 {
                return Err(BridgeError::Validation(format!("Invalid cue time: {}", cue.time)));
            }
        }
        for clip in &self.audio {
            if clip.clip_id.trim().is_empty() {
                return Err(BridgeError::Validation("Timeline clip reference without clipId".to_string()));
            }
            if !clip.time.is_finite() || clip.time < 0.0 {
                return Err(BridgeError::Validation(format!("Invalid clip time: {}", clip.time)));
            }
        }

        // Stable: equal timestamps keep document order.
        self.cues.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.audio.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(())
    }

    /// Time at which playback is over, given the registered clip lengths
    fn end_time(&self, clips: &HashMap<String, DecodedAudio>) -> f64 {
        let last_cue = self.cues.last().map(|c| c.time).unwrap_or(0.0);
        let last_clip_end = self
            .audio
            .iter()
            .map(|r| r.time + clips.get(&r.clip_id).map(|a| a.duration_secs).unwrap_or(0.0))
            .fold(0.0, f64::max);
        self.duration.unwrap_or(0.0).max(last_cue).max(last_clip_end)
    }
}

/// Player state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineState {
    Idle,
    Loaded,
    Playing,
    Completed,
}

/// Events produced while advancing
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    SentenceStarted(String),
    SentenceEnded(String),
    SubtitleStarted(String),
    SubtitleEnded(String),
    ClipStarted(String),
    Completed,
}

impl From<&TimelineCue> for TimelineEvent {
    fn from(cue: &TimelineCue) -> Self {
        let text = cue.text.clone();
        match cue.kind {
            CueKind::SentenceStart => TimelineEvent::SentenceStarted(text),
            CueKind::SentenceEnd => TimelineEvent::SentenceEnded(text),
            CueKind::SubtitleStart => TimelineEvent::SubtitleStarted(text),
            CueKind::SubtitleEnd => TimelineEvent::SubtitleEnded(text),
        }
    }
}

/// Plays a loaded timeline on an avatar's audio output
pub struct TimelinePlayer {
    output: Box<dyn AudioOutput>,
    document: Option<TimelineDocument>,
    clips: HashMap<String, DecodedAudio>,
    state: TimelineState,
    elapsed: f64,
    end_time: f64,
    next_cue: usize,
    next_clip: usize,
    /// Mute state to restore when a forced-mute session ends
    restore_mute: Option<bool>,
}

impl TimelinePlayer {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            document: None,
            clips: HashMap::new(),
            state: TimelineState::Idle,
            elapsed: 0.0,
            end_time: 0.0,
            next_cue: 0,
            next_clip: 0,
            restore_mute: None,
        }
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TimelineState::Playing
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document.as_ref().and_then(|d| d.id.as_deref())
    }

    /// Load a document, replacing any previous one
    pub fn load(&mut self, document: TimelineDocument) {
        self.stop();
        info!(
            "Timeline loaded: {} cues, {} clip references",
            document.cues.len(),
            document.audio.len()
        );
        self.document = Some(document);
        self.state = TimelineState::Loaded;
    }

    /// Register a decoded clip under the name the document references
    pub fn register_clip(&mut self, clip_id: &str, audio: DecodedAudio) -> Result<(), BridgeError> {
        if clip_id.trim().is_empty() {
            return Err(BridgeError::Timeline("No clipId provided".to_string()));
        }
        debug!("Timeline clip registered: {} ({:.2}s)", clip_id, audio.duration_secs);
        self.clips.insert(clip_id.to_string(), audio);
        Ok(())
    }

    /// Start (or restart) playback from the beginning.
    ///
    /// With `play_audio == false` the output is muted for this session and
    /// its previous mute state restored when the session ends.
    pub fn play(&mut self, play_audio: bool) -> Result<(), BridgeError> {
        let end_time = match self.document {
            Some(ref document) => document.end_time(&self.clips),
            None => return Err(BridgeError::Timeline("No timeline loaded".to_string())),
        };

        self.stop();
        self.elapsed = 0.0;
        self.next_cue = 0;
        self.next_clip = 0;
        self.end_time = end_time;
        if !play_audio {
            self.restore_mute = Some(self.output.is_muted());
            self.output.set_muted(true);
        }
        self.state = TimelineState::Playing;
        info!("Timeline playing ({:.2}s, audio={})", end_time, play_audio);
        Ok(())
    }

    /// Advance the clock and collect the events that became due
    pub fn advance(&mut self, delta_secs: f64) -> Vec<TimelineEvent> {
        let mut events = Vec::new();
        if self.state != TimelineState::Playing {
            return events;
        }
        let document = match self.document {
            Some(ref document) => document,
            None => return events,
        };

        if delta_secs.is_finite() && delta_secs > 0.0 {
            self.elapsed += delta_secs;
        }

        loop {
            let cue_due = document.cues.get(self.next_cue).filter(|c| c.time <= self.elapsed);
            let clip_due = document.audio.get(self.next_clip).filter(|c| c.time <= self.elapsed);
            match (cue_due, clip_due) {
                (None, None) => break,
                (Some(cue), Some(clip)) if cue.time < clip.time => {
                    events.push(TimelineEvent::from(cue));
                    self.next_cue += 1;
                }
                (Some(cue), None) => {
                    events.push(TimelineEvent::from(cue));
                    self.next_cue += 1;
                }
                (_, Some(clip)) => {
                    match self.clips.get(&clip.clip_id) {
                        Some(audio) => {
                            self.output.play_clip(&clip.clip_id, audio);
                            events.push(TimelineEvent::ClipStarted(clip.clip_id.clone()));
                        }
                        None => warn!("Timeline clip '{}' was never loaded, skipping", clip.clip_id),
                    }
                    self.next_clip += 1;
                }
            }
        }

        let all_fired = self.next_cue >= document.cues.len() && self.next_clip >= document.audio.len();
        if all_fired && self.elapsed >= self.end_time {
            self.restore_forced_mute();
            self.state = TimelineState::Completed;
            info!("Timeline completed after {:.2}s", self.elapsed);
            events.push(TimelineEvent::Completed);
        }
        events
    }

    /// Stop an active session without completing it
    pub fn stop(&mut self) {
        if self.state == TimelineState::Playing {
            self.output.stop();
            self.restore_forced_mute();
            self.state = TimelineState::Loaded;
            debug!("Timeline stopped at {:.2}s", self.elapsed);
        }
    }

    /// Back to `Idle`: stop, forget the document and clips
    pub fn reset(&mut self) {
        self.stop();
        self.document = None;
        self.clips.clear();
        self.state = TimelineState::Idle;
    }

    fn restore_forced_mute(&mut self) {
        if let Some(muted) = self.restore_mute.take() {
            self.output.set_muted(muted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_cues_stably() {
        let doc = TimelineDocument::parse(
            r#"{
                "id": "t1",
                "cues": [
                    {"time": 1.0, "type": "sentenceEnd", "text": "a"},
                    {"time": 0.0, "type": "sentenceStart", "text": "a"},
                    {"time": 0.0, "type": "subtitleStart", "text": "sub"}
                ]
            }"#,
        )
        .unwrap();
        let kinds: Vec<CueKind> = doc.cues.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CueKind::SentenceStart, CueKind::SubtitleStart, CueKind::SentenceEnd]);
    }

    #[test]
    fn test_parse_rejects_negative_times() {
        let err = TimelineDocument::parse(r#"{"cues":[{"time":-1.0,"type":"sentenceStart"}]}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_cue_type() {
        assert!(TimelineDocument::parse(r#"{"cues":[{"time":0.0,"type":"wink"}]}"#).is_err());
    }
}
