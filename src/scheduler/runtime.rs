//! Per-symposium runtime state.
//!
//! One `SymposiumRuntime` exists per running symposium. The loop task reads
//! and writes it during a turn while control operations mutate the override,
//! whisper, bot-state and wake fields concurrently, so every field sits
//! behind its own lock. Locks are never held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use super::circuit::CircuitBreaker;
use super::history::{SpeakerStats, SpeakingHistory};
use super::settings::SchedulerSettings;
use super::wake::WakeSignal;
use crate::domain::BotState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct SymposiumRuntime {
    conversation_id: String,
    states: Mutex<HashMap<String, BotState>>,
    history: Mutex<SpeakingHistory>,
    circuit: Mutex<CircuitBreaker>,
    next_speaker: Mutex<Option<String>>,
    whispers: Mutex<HashMap<String, String>>,
    current_speaker: Mutex<Option<String>>,
    wake: WakeSignal,
    cancel: CancellationToken,
}

impl SymposiumRuntime {
    pub fn new(conversation_id: &str, settings: &SchedulerSettings) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            states: Mutex::new(HashMap::new()),
            history: Mutex::new(SpeakingHistory::new(settings.history_capacity)),
            circuit: Mutex::new(CircuitBreaker::new(settings.max_consecutive_errors)),
            next_speaker: Mutex::new(None),
            whispers: Mutex::new(HashMap::new()),
            current_speaker: Mutex::new(None),
            wake: WakeSignal::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // Bot states

    pub fn bot_state(&self, model: &str) -> BotState {
        lock(&self.states).get(model).copied().unwrap_or_default()
    }

    pub fn set_bot_state(&self, model: &str, state: BotState) {
        lock(&self.states).insert(model.to_string(), state);
    }

    pub fn bot_states(&self) -> HashMap<String, BotState> {
        lock(&self.states).clone()
    }

    // Override and whispers

    pub fn set_override(&self, model: &str) {
        *lock(&self.next_speaker) = Some(model.to_string());
    }

    /// Take the pending override, leaving the slot empty.
    pub fn take_override(&self) -> Option<String> {
        lock(&self.next_speaker).take()
    }

    pub fn add_whisper(&self, model: &str, text: &str) {
        lock(&self.whispers).insert(model.to_string(), text.to_string());
    }

    pub fn take_whisper(&self, model: &str) -> Option<String> {
        lock(&self.whispers).remove(model)
    }

    pub fn has_whisper(&self, model: &str) -> bool {
        lock(&self.whispers).contains_key(model)
    }

    // Current speaker

    pub fn current_speaker(&self) -> Option<String> {
        lock(&self.current_speaker).clone()
    }

    pub fn set_current_speaker(&self, model: Option<&str>) {
        *lock(&self.current_speaker) = model.map(str::to_string);
    }

    // Circuit breaker

    pub fn record_failure(&self, model: &str) -> u32 {
        lock(&self.circuit).record_failure(model)
    }

    pub fn record_success(&self, model: &str) {
        lock(&self.circuit).record_success(model);
    }

    pub fn circuit_open(&self, model: &str) -> bool {
        lock(&self.circuit).is_open(model)
    }

    pub fn error_count(&self, model: &str) -> u32 {
        lock(&self.circuit).count(model)
    }

    pub fn circuit_opens_at(&self, count: u32) -> bool {
        lock(&self.circuit).opens_at(count)
    }

    // Speaking history

    pub fn record_speaking(&self, model: &str, word_count: usize) {
        lock(&self.history).record(model, word_count);
    }

    pub fn speaking_stats(&self) -> BTreeMap<String, SpeakerStats> {
        lock(&self.history).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> SymposiumRuntime {
        SymposiumRuntime::new("chat-1", &SchedulerSettings::default())
    }

    #[test]
    fn test_unknown_bot_is_active() {
        let rt = runtime();
        assert_eq!(rt.bot_state("alpha"), BotState::Active);
        assert!(rt.bot_states().is_empty());
    }

    #[test]
    fn test_set_bot_state() {
        let rt = runtime();
        rt.set_bot_state("alpha", BotState::Muted);
        assert_eq!(rt.bot_state("alpha"), BotState::Muted);
        assert_eq!(rt.bot_states().get("alpha"), Some(&BotState::Muted));
    }

    #[test]
    fn test_override_consumed_on_take() {
        let rt = runtime();
        rt.set_override("bravo");
        rt.set_override("charlie");
        assert_eq!(rt.take_override().as_deref(), Some("charlie"));
        assert_eq!(rt.take_override(), None);
    }

    #[test]
    fn test_whisper_single_use() {
        let rt = runtime();
        rt.add_whisper("alpha", "be brief");
        assert!(rt.has_whisper("alpha"));
        assert_eq!(rt.take_whisper("bravo"), None);
        assert_eq!(rt.take_whisper("alpha").as_deref(), Some("be brief"));
        assert_eq!(rt.take_whisper("alpha"), None);
    }

    #[test]
    fn test_circuit_via_runtime() {
        let rt = runtime();
        assert_eq!(rt.record_failure("alpha"), 1);
        assert_eq!(rt.record_failure("alpha"), 2);
        assert!(!rt.circuit_open("alpha"));
        assert_eq!(rt.record_failure("alpha"), 3);
        assert!(rt.circuit_open("alpha"));
        assert!(rt.circuit_opens_at(3));
        rt.record_success("alpha");
        assert_eq!(rt.error_count("alpha"), 0);
    }

    #[test]
    fn test_current_speaker() {
        let rt = runtime();
        assert_eq!(rt.current_speaker(), None);
        rt.set_current_speaker(Some("alpha"));
        assert_eq!(rt.current_speaker().as_deref(), Some("alpha"));
        rt.set_current_speaker(None);
        assert_eq!(rt.current_speaker(), None);
    }

    #[test]
    fn test_speaking_stats() {
        let rt = runtime();
        rt.record_speaking("alpha", 12);
        rt.record_speaking("alpha", 3);
        let stats = rt.speaking_stats();
        assert_eq!(stats["alpha"].message_count, 2);
        assert_eq!(stats["alpha"].word_count, 15);
    }
}
