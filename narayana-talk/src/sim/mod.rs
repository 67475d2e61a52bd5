//! In-memory collaborators
//!
//! Deterministic implementations of every collaborator trait, used by the
//! host simulator binary and by the tests. Each one is a cheap clonable
//! handle over shared state, so a test can keep a handle after giving the
//! bridge its own copy and inspect or script it later.

pub mod decoder;
pub mod engine;
pub mod host;
pub mod scene;

pub use decoder::{DecodeBehavior, SimDecoder};
pub use engine::{SimAudioOutput, SimEngine};
pub use host::RecordingHost;
pub use scene::{SimLook, SimScene};

use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered record of collaborator calls shared by every sim object of one setup
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e.starts_with(prefix))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
