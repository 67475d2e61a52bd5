//! Audio ingestion: host-pending raw bytes to a decoded buffer
//!
//! Decoding is asynchronous on the platform side. Each in-flight decode is a
//! [`PendingDecode`] that is polled once per tick until it loads, fails or
//! exhausts its tick budget. The transient resource backing a decode is owned
//! by a [`TransientResource`] guard and released when the guard drops, so
//! every exit path (success, failure, timeout, cancellation) releases it.

use crate::error::BridgeError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Encoded audio formats the host may hand over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    Wav,
    Mpeg,
    OggVorbis,
    Aac,
    Unknown,
}

impl AudioFormat {
    /// Map a host format name (`wav`, `mp3`, `ogg`, `m4a`) to a decoder format
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "wav" => AudioFormat::Wav,
            "mp3" => AudioFormat::Mpeg,
            "ogg" => AudioFormat::OggVorbis,
            "m4a" => AudioFormat::Aac,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mpeg => "mp3",
            AudioFormat::OggVorbis => "ogg",
            AudioFormat::Aac => "m4a",
            AudioFormat::Unknown => "unknown",
        }
    }
}

/// Fully decoded audio, ready for the avatar engine
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub pcm: Bytes,
    pub channels: u16,
    pub frequency: u32,
    pub duration_secs: f64,
}

/// Opaque handle to host-pending raw bytes (e.g. a blob URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub String);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform decode job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeJob(pub u64);

/// Polled decode status
#[derive(Debug, Clone)]
pub enum DecodeStatus {
    Loading,
    Loaded(DecodedAudio),
    Failed(String),
}

/// Platform audio decoder
pub trait AudioDecoder: Send + Sync {
    /// Claim the host's pending raw bytes as a transient resource
    fn acquire_pending(&self, format: AudioFormat) -> Option<ResourceHandle>;

    /// Start an asynchronous decode of a claimed resource
    fn start_decode(&self, resource: &ResourceHandle, format: AudioFormat) -> Result<DecodeJob, BridgeError>;

    /// Check decode progress; never blocks
    fn poll(&self, job: DecodeJob) -> DecodeStatus;

    /// Give a transient resource back to the platform
    fn release(&self, resource: &ResourceHandle);
}

/// Owns a transient resource and releases it on drop
pub struct TransientResource {
    handle: ResourceHandle,
    decoder: Arc<dyn AudioDecoder>,
}

impl TransientResource {
    pub fn new(handle: ResourceHandle, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { handle, decoder }
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl Drop for TransientResource {
    fn drop(&mut self) {
        debug!("Releasing transient audio resource {}", self.handle);
        self.decoder.release(&self.handle);
    }
}

/// What a decode is for, carried through to its completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodePurpose {
    /// Hand the buffer to the engine's prepare call, with optional subtitle text
    Prepare { text: String },
    /// Register the buffer as a named timeline clip
    TimelineClip { clip_id: String },
}

impl DecodePurpose {
    /// Host method that started this decode
    pub fn method(&self) -> &'static str {
        match self {
            DecodePurpose::Prepare { .. } => "PrepareAudio",
            DecodePurpose::TimelineClip { .. } => "LoadTimelineAudio",
        }
    }
}

/// Terminal result of a decode
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Loaded(DecodedAudio),
    Failed(String),
    TimedOut,
}

impl DecodeOutcome {
    /// Convert a non-success outcome to the error surfaced to the host
    pub fn into_result(self) -> Result<DecodedAudio, BridgeError> {
        match self {
            DecodeOutcome::Loaded(audio) => Ok(audio),
            DecodeOutcome::Failed(reason) => {
                Err(BridgeError::Resource(format!("Audio decode failed: {}", reason)))
            }
            DecodeOutcome::TimedOut => Err(BridgeError::Resource(
                "Audio decode timed out (state=Loading)".to_string(),
            )),
        }
    }
}

/// In-flight decode state
pub struct PendingDecode {
    purpose: DecodePurpose,
    format: AudioFormat,
    job: DecodeJob,
    resource: TransientResource,
    elapsed_ticks: u32,
}

/// A decode that reached a terminal state; its resource is already released
#[derive(Debug, Clone)]
pub struct CompletedDecode {
    pub purpose: DecodePurpose,
    pub format: AudioFormat,
    pub outcome: DecodeOutcome,
    pub elapsed_ticks: u32,
}

impl PendingDecode {
    fn finish(self, status: DecodeStatus) -> CompletedDecode {
        let outcome = match status {
            DecodeStatus::Loaded(audio) => {
                info!(
                    "Decoded {} audio for {}: {:.2}s, {} ch, {} Hz",
                    self.format.as_str(),
                    self.purpose.method(),
                    audio.duration_secs,
                    audio.channels,
                    audio.frequency
                );
                DecodeOutcome::Loaded(audio)
            }
            DecodeStatus::Failed(reason) => {
                warn!("Decode of {} failed: {}", self.resource.handle(), reason);
                DecodeOutcome::Failed(reason)
            }
            DecodeStatus::Loading => {
                warn!(
                    "Decode of {} timed out after {} ticks",
                    self.resource.handle(),
                    self.elapsed_ticks
                );
                DecodeOutcome::TimedOut
            }
        };
        // Dropping `self.resource` here releases the handle.
        CompletedDecode {
            purpose: self.purpose,
            format: self.format,
            outcome,
            elapsed_ticks: self.elapsed_ticks,
        }
    }
}

/// Tick-driven decode pipeline
pub struct IngestionPipeline {
    decoder: Arc<dyn AudioDecoder>,
    budget_ticks: u32,
    pending: Vec<PendingDecode>,
}

impl IngestionPipeline {
    pub fn new(decoder: Arc<dyn AudioDecoder>, budget_ticks: u32) -> Self {
        Self {
            decoder,
            budget_ticks: budget_ticks.max(1),
            pending: Vec::new(),
        }
    }

    /// Claim pending bytes and start decoding them.
    ///
    /// Fails immediately, without a decode attempt, when the host has no
    /// pending bytes.
    pub fn begin(&mut self, purpose: DecodePurpose, format: AudioFormat) -> Result<(), BridgeError> {
        let handle = self
            .decoder
            .acquire_pending(format)
            .ok_or_else(|| BridgeError::Resource("No audio data pending".to_string()))?;
        let resource = TransientResource::new(handle, Arc::clone(&self.decoder));

        let job = self.decoder.start_decode(resource.handle(), format)?;
        debug!(
            "Started {} decode {:?} for {}",
            format.as_str(),
            job,
            purpose.method()
        );

        self.pending.push(PendingDecode {
            purpose,
            format,
            job,
            resource,
            elapsed_ticks: 0,
        });
        Ok(())
    }

    /// Poll every in-flight decode once; returns the ones that finished this tick
    pub fn poll(&mut self) -> Vec<CompletedDecode> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let mut still_pending = Vec::with_capacity(self.pending.len());
        let mut completed = Vec::new();
        for mut decode in self.pending.drain(..) {
            decode.elapsed_ticks += 1;
            match self.decoder.poll(decode.job) {
                DecodeStatus::Loading if decode.elapsed_ticks < self.budget_ticks => {
                    still_pending.push(decode)
                }
                status => completed.push(decode.finish(status)),
            }
        }
        self.pending = still_pending;
        completed
    }

    /// Number of decodes still in flight
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Abandon every in-flight decode, releasing their resources
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            info!("Cancelling {} in-flight decodes", self.pending.len());
        }
        self.pending.clear();
    }
}
