//! Turn selection: decides who speaks next.
//!
//! Precedence is override > tag > round robin. The candidate then passes the
//! circuit-breaker filter (skipped for tagged picks) and the bot-state filter.
//! A tag or override marks the pick as `tagged`, which is what lets a
//! listening participant speak when addressed directly.

use crate::domain::{BotState, ChatMessage};

use super::tags::{extract_tags, match_tag};

/// How the initial candidate was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Override,
    Tag,
    RoundRobin,
    /// Replaced by the circuit-breaker or bot-state filter
    Fallback,
}

/// Outcome of one selection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Speak {
        model: String,
        tagged: bool,
        source: SelectionSource,
    },
    /// Every candidate is circuit-open or inactive; back off
    AllCircuitsOpen,
    /// Nobody is allowed to speak; wait for a wake signal
    NoActiveSpeaker,
}

/// Everything selection reads. Lookups are closures so the caller decides
/// how state is stored and locked.
pub struct TurnSelector<'a> {
    pub models: &'a [String],
    pub last_message: Option<&'a ChatMessage>,
    /// Already taken out of the override slot by the caller
    pub override_model: Option<&'a str>,
    pub state_of: &'a dyn Fn(&str) -> BotState,
    pub circuit_open: &'a dyn Fn(&str) -> bool,
}

impl<'a> TurnSelector<'a> {
    pub fn select(&self) -> Selection {
        if self.models.is_empty() {
            return Selection::NoActiveSpeaker;
        }

        let (mut model, tagged, mut source) = self.initial_candidate();

        if !tagged && (self.circuit_open)(model) {
            tracing::debug!(model = %model, "Skipping participant with open circuit");
            let fallback = self.models.iter().find(|m| {
                m.as_str() != model && !(self.circuit_open)(m.as_str()) && (self.state_of)(m.as_str()).is_active()
            });
            match fallback {
                Some(fallback) => {
                    model = fallback.as_str();
                    source = SelectionSource::Fallback;
                }
                None => return Selection::AllCircuitsOpen,
            }
        }

        match (self.state_of)(model) {
            BotState::Muted => match self.first_active() {
                Some(active) => {
                    model = active;
                    source = SelectionSource::Fallback;
                }
                None => return Selection::NoActiveSpeaker,
            },
            BotState::Listening if !tagged => match self.next_active_after(model) {
                Some(active) => {
                    model = active;
                    source = SelectionSource::Fallback;
                }
                None => return Selection::NoActiveSpeaker,
            },
            _ => {}
        }

        Selection::Speak {
            model: model.to_string(),
            tagged,
            source,
        }
    }

    fn initial_candidate(&self) -> (&'a str, bool, SelectionSource) {
        if let Some(forced) = self.override_model
            && let Some(m) = self.models.iter().find(|m| m.as_str() == forced)
        {
            return (m.as_str(), true, SelectionSource::Override);
        }

        if let Some(last) = self.last_message {
            let tags = extract_tags(&last.content);
            if let Some(m) = match_tag(&tags, self.models) {
                return (m, true, SelectionSource::Tag);
            }
        }

        let next = self
            .last_message
            .and_then(|m| m.model.as_deref())
            .and_then(|last| self.models.iter().position(|m| m == last))
            .map(|idx| (idx + 1) % self.models.len())
            .unwrap_or(0);

        (self.models[next].as_str(), false, SelectionSource::RoundRobin)
    }

    fn first_active(&self) -> Option<&'a str> {
        self.models
            .iter()
            .find(|m| (self.state_of)(m.as_str()).is_active())
            .map(String::as_str)
    }

    /// Scan forward from `start`, wrapping, for the next active participant.
    fn next_active_after(&self, start: &str) -> Option<&'a str> {
        let len = self.models.len();
        let start_idx = self.models.iter().position(|m| m == start).unwrap_or(0);
        (1..=len)
            .map(|offset| &self.models[(start_idx + offset) % len])
            .find(|m| (self.state_of)(m.as_str()).is_active())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn models() -> Vec<String> {
        vec!["alpha".to_string(), "bravo".to_string(), "charlie".to_string()]
    }

    fn reply(model: &str, content: &str) -> ChatMessage {
        ChatMessage::assistant(model, content, None)
    }

    struct Fixture {
        states: HashMap<String, BotState>,
        open: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                states: HashMap::new(),
                open: Vec::new(),
            }
        }

        fn state(mut self, model: &str, state: BotState) -> Self {
            self.states.insert(model.to_string(), state);
            self
        }

        fn open(mut self, model: &str) -> Self {
            self.open.push(model.to_string());
            self
        }

        fn select(&self, models: &[String], last: Option<&ChatMessage>, forced: Option<&str>) -> Selection {
            let state_of = |m: &str| self.states.get(m).copied().unwrap_or_default();
            let circuit_open = |m: &str| self.open.iter().any(|o| o == m);
            TurnSelector {
                models,
                last_message: last,
                override_model: forced,
                state_of: &state_of,
                circuit_open: &circuit_open,
            }
            .select()
        }
    }

    fn speaker(selection: &Selection) -> &str {
        match selection {
            Selection::Speak { model, .. } => model,
            other => panic!("expected a speaker, got {:?}", other),
        }
    }

    #[test]
    fn test_no_prior_message_picks_first() {
        let sel = Fixture::new().select(&models(), None, None);
        assert_eq!(speaker(&sel), "alpha");
    }

    #[test]
    fn test_round_robin_cycles_and_wraps() {
        let fx = Fixture::new();
        let m = models();
        let mut last = None;
        let mut order = Vec::new();
        for _ in 0..5 {
            let sel = fx.select(&m, last.as_ref(), None);
            let next = speaker(&sel).to_string();
            last = Some(reply(&next, "ok"));
            order.push(next);
        }
        assert_eq!(order, vec!["alpha", "bravo", "charlie", "alpha", "bravo"]);
    }

    #[test]
    fn test_unknown_prior_model_restarts_at_first() {
        let last = reply("delta", "hello");
        let sel = Fixture::new().select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "alpha");
    }

    #[test]
    fn test_user_message_without_model_picks_first() {
        let last = ChatMessage::user("what does everyone think?");
        let sel = Fixture::new().select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "alpha");
    }

    #[test]
    fn test_override_wins_over_tag_and_round_robin() {
        let last = reply("alpha", "@bravo your turn");
        let sel = Fixture::new().select(&models(), Some(&last), Some("charlie"));
        assert_eq!(
            sel,
            Selection::Speak {
                model: "charlie".to_string(),
                tagged: true,
                source: SelectionSource::Override
            }
        );
    }

    #[test]
    fn test_invalid_override_falls_through() {
        let last = reply("alpha", "no tags");
        let sel = Fixture::new().select(&models(), Some(&last), Some("zulu"));
        assert_eq!(speaker(&sel), "bravo");
        assert!(matches!(sel, Selection::Speak { tagged: false, .. }));
    }

    #[test]
    fn test_tag_beats_round_robin() {
        // Round robin after charlie would be alpha
        let last = reply("charlie", "I'd like to hear from @bravo");
        let sel = Fixture::new().select(&models(), Some(&last), None);
        assert_eq!(
            sel,
            Selection::Speak {
                model: "bravo".to_string(),
                tagged: true,
                source: SelectionSource::Tag
            }
        );
    }

    #[test]
    fn test_circuit_open_falls_back_to_first_closed_active() {
        let fx = Fixture::new().open("bravo");
        let last = reply("alpha", "done");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "alpha");
    }

    #[test]
    fn test_circuit_fallback_skips_inactive() {
        let fx = Fixture::new().open("bravo").state("alpha", BotState::Listening);
        let last = reply("alpha", "done");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "charlie");
    }

    #[test]
    fn test_all_circuits_open() {
        let fx = Fixture::new().open("alpha").open("bravo").open("charlie");
        let sel = fx.select(&models(), None, None);
        assert_eq!(sel, Selection::AllCircuitsOpen);
    }

    #[test]
    fn test_tag_bypasses_open_circuit() {
        let fx = Fixture::new().open("charlie");
        let last = reply("alpha", "@charlie?");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "charlie");
    }

    #[test]
    fn test_muted_replaced_by_first_active() {
        let fx = Fixture::new().state("charlie", BotState::Muted);
        let last = reply("bravo", "over to you");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "alpha");
        assert!(matches!(sel, Selection::Speak { source: SelectionSource::Fallback, .. }));
    }

    #[test]
    fn test_muted_even_when_tagged() {
        let fx = Fixture::new().state("bravo", BotState::Muted);
        let last = reply("alpha", "@bravo");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "alpha");
    }

    #[test]
    fn test_all_muted_or_listening_waits() {
        let fx = Fixture::new()
            .state("alpha", BotState::Muted)
            .state("bravo", BotState::Listening)
            .state("charlie", BotState::Muted);
        let sel = fx.select(&models(), None, None);
        assert_eq!(sel, Selection::NoActiveSpeaker);
    }

    #[test]
    fn test_listening_skipped_forward_with_wrap() {
        let fx = Fixture::new()
            .state("charlie", BotState::Listening)
            .state("alpha", BotState::Muted);
        let last = reply("bravo", "next");
        let sel = fx.select(&models(), Some(&last), None);
        // charlie listening -> scan forward: alpha (muted), bravo (active)
        assert_eq!(speaker(&sel), "bravo");
    }

    #[test]
    fn test_listening_speaks_when_tagged() {
        let fx = Fixture::new().state("charlie", BotState::Listening);
        let last = reply("alpha", "what about @Charlie");
        let sel = fx.select(&models(), Some(&last), None);
        assert_eq!(speaker(&sel), "charlie");
    }

    #[test]
    fn test_listening_speaks_when_overridden() {
        let fx = Fixture::new().state("bravo", BotState::Listening);
        let sel = fx.select(&models(), None, Some("bravo"));
        assert_eq!(speaker(&sel), "bravo");
    }

    #[test]
    fn test_all_listening_waits() {
        let fx = Fixture::new()
            .state("alpha", BotState::Listening)
            .state("bravo", BotState::Listening)
            .state("charlie", BotState::Listening);
        assert_eq!(fx.select(&models(), None, None), Selection::NoActiveSpeaker);
    }

    #[test]
    fn test_empty_models() {
        assert_eq!(Fixture::new().select(&[], None, None), Selection::NoActiveSpeaker);
    }
}
