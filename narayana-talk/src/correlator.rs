//! Correlates engine "prepared" callbacks with the requests that caused them

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What to do with a "prepared" callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedAction {
    /// Only forward the notification
    Forward,
    /// Forward, then play the entry right away
    AutoPlay { play_audio: bool },
}

#[derive(Debug, Clone)]
struct OutstandingPrepare {
    origin: &'static str,
    generation: u64,
    requested_at: DateTime<Utc>,
}

/// Pending-autoplay bookkeeping plus every prepare still awaiting its terminal callback
#[derive(Debug, Default)]
pub struct CacheCorrelator {
    autoplay: HashSet<String>,
    play_audio: HashMap<String, bool>,
    outstanding: HashMap<String, OutstandingPrepare>,
}

impl CacheCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a cache id returned by a prepare call on binding `generation`
    pub fn track_prepare(&mut self, cache_id: &str, origin: &'static str, generation: u64) {
        self.outstanding.insert(
            cache_id.to_string(),
            OutstandingPrepare {
                origin,
                generation,
                requested_at: Utc::now(),
            },
        );
    }

    /// Play `cache_id` automatically once it is prepared
    pub fn register_autoplay(&mut self, cache_id: &str, play_audio: bool) {
        self.autoplay.insert(cache_id.to_string());
        self.play_audio.insert(cache_id.to_string(), play_audio);
    }

    pub fn on_prepared(&mut self, cache_id: &str) -> PreparedAction {
        if let Some(prepare) = self.outstanding.remove(cache_id) {
            let waited = Utc::now() - prepare.requested_at;
            debug!(
                "{} prepare {} completed after {}ms",
                prepare.origin,
                cache_id,
                waited.num_milliseconds()
            );
        }

        if self.autoplay.remove(cache_id) {
            let play_audio = self.play_audio.remove(cache_id).unwrap_or(true);
            PreparedAction::AutoPlay { play_audio }
        } else {
            PreparedAction::Forward
        }
    }

    /// Drop every pending entry for a failed prepare
    pub fn on_prepare_failed(&mut self, cache_id: &str) {
        self.discard(cache_id);
    }

    pub fn discard(&mut self, cache_id: &str) {
        self.outstanding.remove(cache_id);
        self.autoplay.remove(cache_id);
        self.play_audio.remove(cache_id);
    }

    /// Forget every prepare issued on a torn-down binding; returns their ids,
    /// oldest first
    pub fn retire_generation(&mut self, generation: u64) -> Vec<String> {
        let mut retired: Vec<(String, DateTime<Utc>)> = self
            .outstanding
            .iter()
            .filter(|(_, p)| p.generation == generation)
            .map(|(id, p)| (id.clone(), p.requested_at))
            .collect();
        retired.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        for (id, _) in &retired {
            self.discard(id);
        }
        retired.into_iter().map(|(id, _)| id).collect()
    }

    pub fn is_outstanding(&self, cache_id: &str) -> bool {
        self.outstanding.contains_key(cache_id)
    }

    pub fn pending_autoplay(&self) -> usize {
        self.autoplay.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autoplay_consumed_once() {
        let mut correlator = CacheCorrelator::new();
        correlator.track_prepare("c1", "Speak", 1);
        correlator.register_autoplay("c1", false);

        assert_eq!(correlator.on_prepared("c1"), PreparedAction::AutoPlay { play_audio: false });
        assert_eq!(correlator.on_prepared("c1"), PreparedAction::Forward);
        assert!(!correlator.is_outstanding("c1"));
    }

    #[test]
    fn test_missing_flag_defaults_to_play_audio() {
        let mut correlator = CacheCorrelator::new();
        correlator.autoplay.insert("c2".to_string());
        assert_eq!(correlator.on_prepared("c2"), PreparedAction::AutoPlay { play_audio: true });
    }

    #[test]
    fn test_prepare_failed_clears_autoplay() {
        let mut correlator = CacheCorrelator::new();
        correlator.track_prepare("c3", "Chat", 1);
        correlator.register_autoplay("c3", true);
        correlator.on_prepare_failed("c3");

        assert_eq!(correlator.pending_autoplay(), 0);
        assert_eq!(correlator.on_prepared("c3"), PreparedAction::Forward);
    }

    #[test]
    fn test_unknown_ids_are_forwarded() {
        let mut correlator = CacheCorrelator::new();
        assert_eq!(correlator.on_prepared("never-seen"), PreparedAction::Forward);
        correlator.on_prepare_failed("never-seen");
    }

    #[test]
    fn test_retire_generation_only_touches_that_binding() {
        let mut correlator = CacheCorrelator::new();
        correlator.track_prepare("old-a", "PrepareAudio", 1);
        correlator.track_prepare("old-b", "Speak", 1);
        correlator.register_autoplay("old-b", true);
        correlator.track_prepare("new", "Speak", 2);

        let mut retired = correlator.retire_generation(1);
        retired.sort();
        assert_eq!(retired, vec!["old-a".to_string(), "old-b".to_string()]);
        assert_eq!(correlator.pending_autoplay(), 0);
        assert!(correlator.is_outstanding("new"));
    }
}
