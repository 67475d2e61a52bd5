//! In-memory platform decoder

use super::CallLog;
use crate::error::BridgeError;
use crate::ingestion::{AudioDecoder, AudioFormat, DecodeJob, DecodeStatus, DecodedAudio, ResourceHandle};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

const SAMPLE_RATE: u32 = 16_000;

/// How decodes started from now on behave
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeBehavior {
    /// Loaded after this many polls (1 = on the first poll)
    Succeed { after_polls: u32 },
    Fail(String),
    /// Stays `Loading` forever
    Hang,
}

impl Default for DecodeBehavior {
    fn default() -> Self {
        DecodeBehavior::Succeed { after_polls: 1 }
    }
}

#[derive(Debug)]
struct Job {
    duration_secs: f64,
    behavior: DecodeBehavior,
    polls: u32,
}

#[derive(Debug, Default)]
struct DecoderState {
    pending: VecDeque<f64>,
    blobs: HashMap<String, f64>,
    jobs: HashMap<u64, Job>,
    next_job: u64,
    behavior: DecodeBehavior,
    start_error: Option<String>,
    acquired: Vec<String>,
    released: Vec<String>,
    decode_attempts: usize,
}

/// Decoder fed by [`SimDecoder::queue_audio`], standing in for bytes the
/// host pushed before calling `PrepareAudio`/`LoadTimelineAudio`
#[derive(Debug, Clone)]
pub struct SimDecoder {
    state: Arc<Mutex<DecoderState>>,
    log: CallLog,
}

impl SimDecoder {
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(DecoderState::default())),
            log,
        }
    }

    /// Queue raw bytes that decode to `duration_secs` of audio
    pub fn queue_audio(&self, duration_secs: f64) {
        self.state.lock().pending.push_back(duration_secs);
    }

    pub fn set_behavior(&self, behavior: DecodeBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Make `start_decode` itself fail
    pub fn set_start_error(&self, error: Option<String>) {
        self.state.lock().start_error = error;
    }

    pub fn acquired(&self) -> Vec<String> {
        self.state.lock().acquired.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.state.lock().released.clone()
    }

    /// Handles acquired but not yet released
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state
            .acquired
            .iter()
            .filter(|h| !state.released.contains(h))
            .count()
    }

    /// Number of `start_decode` calls
    pub fn decode_attempts(&self) -> usize {
        self.state.lock().decode_attempts
    }
}

impl AudioDecoder for SimDecoder {
    fn acquire_pending(&self, format: AudioFormat) -> Option<ResourceHandle> {
        let mut state = self.state.lock();
        let duration = state.pending.pop_front()?;
        let handle = format!("blob:sim/{}", Uuid::new_v4());
        state.blobs.insert(handle.clone(), duration);
        state.acquired.push(handle.clone());
        drop(state);

        self.log.record(format!("decoder.acquire {} {}", format.as_str(), handle));
        Some(ResourceHandle(handle))
    }

    fn start_decode(&self, resource: &ResourceHandle, format: AudioFormat) -> Result<DecodeJob, BridgeError> {
        let mut state = self.state.lock();
        state.decode_attempts += 1;
        if let Some(ref error) = state.start_error {
            return Err(BridgeError::Resource(error.clone()));
        }
        let duration_secs = state
            .blobs
            .get(&resource.0)
            .copied()
            .ok_or_else(|| BridgeError::Resource(format!("Unknown audio resource: {}", resource)))?;

        state.next_job += 1;
        let job = state.next_job;
        let behavior = state.behavior.clone();
        state.jobs.insert(
            job,
            Job {
                duration_secs,
                behavior,
                polls: 0,
            },
        );
        drop(state);

        self.log.record(format!("decoder.start {} {}", format.as_str(), job));
        Ok(DecodeJob(job))
    }

    fn poll(&self, job: DecodeJob) -> DecodeStatus {
        let mut state = self.state.lock();
        let job = match state.jobs.get_mut(&job.0) {
            Some(job) => job,
            None => return DecodeStatus::Failed("Unknown decode job".to_string()),
        };
        job.polls += 1;

        match job.behavior {
            DecodeBehavior::Succeed { after_polls } if job.polls >= after_polls => {
                let samples = (job.duration_secs * f64::from(SAMPLE_RATE)) as usize;
                DecodeStatus::Loaded(DecodedAudio {
                    pcm: Bytes::from(vec![0u8; samples * 2]),
                    channels: 1,
                    frequency: SAMPLE_RATE,
                    duration_secs: job.duration_secs,
                })
            }
            DecodeBehavior::Succeed { .. } | DecodeBehavior::Hang => DecodeStatus::Loading,
            DecodeBehavior::Fail(ref reason) => DecodeStatus::Failed(reason.clone()),
        }
    }

    fn release(&self, resource: &ResourceHandle) {
        let mut state = self.state.lock();
        state.blobs.remove(&resource.0);
        state.released.push(resource.0.clone());
        drop(state);

        self.log.record(format!("decoder.release {}", resource));
    }
}
