//! Bounded speaking history and derived per-participant stats.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::settings::MAX_SPEAKING_HISTORY;
use crate::id::now_secs;

/// One successful turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakingEntry {
    /// Unix seconds
    pub timestamp: i64,
    pub model: String,
    pub word_count: usize,
}

/// Aggregates for one participant over the retained window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub message_count: usize,
    pub word_count: usize,
    pub last_spoke: i64,
}

/// FIFO buffer of speaking entries; the oldest entry is evicted when full.
#[derive(Debug, Clone)]
pub struct SpeakingHistory {
    capacity: usize,
    entries: VecDeque<SpeakingEntry>,
}

impl SpeakingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Record a turn at the current time.
    pub fn record(&mut self, model: &str, word_count: usize) {
        self.push(SpeakingEntry {
            timestamp: now_secs(),
            model: model.to_string(),
            word_count,
        });
    }

    pub fn push(&mut self, entry: SpeakingEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &SpeakingEntry> {
        self.entries.iter()
    }

    /// Fold the retained entries into per-participant stats.
    pub fn stats(&self) -> BTreeMap<String, SpeakerStats> {
        let mut stats: BTreeMap<String, SpeakerStats> = BTreeMap::new();
        for entry in &self.entries {
            let s = stats.entry(entry.model.clone()).or_default();
            s.message_count += 1;
            s.word_count += entry.word_count;
            s.last_spoke = s.last_spoke.max(entry.timestamp);
        }
        stats
    }
}

impl Default for SpeakingHistory {
    fn default() -> Self {
        Self::new(MAX_SPEAKING_HISTORY)
    }
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64, model: &str, words: usize) -> SpeakingEntry {
        SpeakingEntry {
            timestamp: ts,
            model: model.to_string(),
            word_count: words,
        }
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two  three\nfour\tfive"), 5);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_stats_fold() {
        let mut history = SpeakingHistory::default();
        history.push(entry(100, "alpha", 10));
        history.push(entry(300, "bravo", 4));
        history.push(entry(200, "alpha", 5));

        let stats = history.stats();
        let alpha = &stats["alpha"];
        assert_eq!(alpha.message_count, 2);
        assert_eq!(alpha.word_count, 15);
        assert_eq!(alpha.last_spoke, 200);
        assert_eq!(stats["bravo"].message_count, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = SpeakingHistory::default();
        history.push(entry(0, "first", 1));
        for i in 1..=1000 {
            history.push(entry(i, "rest", 1));
        }

        assert_eq!(history.len(), 1000);
        let stats = history.stats();
        assert!(!stats.contains_key("first"));
        assert_eq!(stats["rest"].message_count, 1000);
    }

    #[test]
    fn test_small_capacity() {
        let mut history = SpeakingHistory::new(2);
        history.record("a", 1);
        history.record("b", 1);
        history.record("c", 1);
        let models: Vec<_> = history.entries().map(|e| e.model.as_str()).collect();
        assert_eq!(models, vec!["b", "c"]);
    }

    #[test]
    fn test_empty_history() {
        let history = SpeakingHistory::default();
        assert!(history.is_empty());
        assert!(history.stats().is_empty());
    }
}
