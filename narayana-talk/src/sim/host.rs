//! Host stand-in that records every notification

use crate::emitter::{HostCallbacks, WireMessage};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RecordingHost {
    messages: Mutex<Vec<WireMessage>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<WireMessage> {
        self.messages.lock().clone()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Callback names in delivery order
    pub fn methods(&self) -> Vec<&'static str> {
        self.messages.lock().iter().map(|m| m.method).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.messages.lock().iter().filter(|m| m.method == method).count()
    }

    /// Arguments of every delivery of `method`
    pub fn args_of(&self, method: &str) -> Vec<Vec<String>> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.method == method)
            .map(|m| m.args.clone())
            .collect()
    }

    /// Arguments of the latest delivery of `method`
    pub fn last(&self, method: &str) -> Option<Vec<String>> {
        self.args_of(method).pop()
    }
}

impl HostCallbacks for RecordingHost {
    fn deliver(&self, message: WireMessage) {
        self.messages.lock().push(message);
    }
}
