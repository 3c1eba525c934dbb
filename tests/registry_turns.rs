//! Registry integration tests
//!
//! Drives real symposium loops against the in-memory store and the mock
//! generator, with every interval scaled down to milliseconds.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use symposium::domain::{BotState, ChatMessage, Conversation, Role, SymposiumEvent, User, topics};
use symposium::events::RecordingSink;
use symposium::id::now_secs;
use symposium::llm::{MockGenerator, MockReply};
use symposium::scheduler::{SchedulerSettings, SymposiumRegistry};
use symposium::store::MemoryStore;

const CHAT: &str = "chat-1";

struct Fixture {
    store: Arc<MemoryStore>,
    generator: Arc<MockGenerator>,
    sink: Arc<RecordingSink>,
    registry: Arc<SymposiumRegistry>,
}

fn settings() -> SchedulerSettings {
    SchedulerSettings::default()
        .with_time_scale(0.001)
        .with_error_backoff(Duration::from_secs(1))
}

fn fixture(config: Value, opening: &str) -> Fixture {
    fixture_with(config, opening, settings())
}

fn fixture_with(config: Value, opening: &str, settings: SchedulerSettings) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store.insert_user(User::new("user-1", "Ada"));
    store.insert_conversation(
        Conversation::new(CHAT, "user-1")
            .with_config(config)
            .with_message(ChatMessage::user(opening).with_timestamp(now_secs())),
    );

    let generator = Arc::new(MockGenerator::new());
    let sink = Arc::new(RecordingSink::new());
    let registry = SymposiumRegistry::new(store.clone(), store.clone(), generator.clone(), sink.clone(), settings);

    Fixture {
        store,
        generator,
        sink,
        registry,
    }
}

impl Fixture {
    fn speakers(&self) -> Vec<String> {
        self.store
            .messages(CHAT)
            .into_iter()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.model)
            .collect()
    }

    /// Start with the symposium paused, apply `setup`, then unpause.
    async fn start_paused_then(&self, config: Value, setup: impl FnOnce(&SymposiumRegistry)) {
        let mut paused = config.clone();
        paused["paused"] = json!(true);
        self.store.set_config(CHAT, paused).unwrap();

        self.registry.start(CHAT).await;
        setup(&self.registry);

        self.store.set_config(CHAT, config).unwrap();
        self.registry.notify(CHAT);
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn trio() -> Value {
    json!({"models": ["alpha", "bravo", "charlie"], "prompt": "Debate free will."})
}

/// Integration test: participants take turns in config order
#[tokio::test]
async fn test_round_robin_order() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.start(CHAT).await;

    wait_until("four turns", || f.speakers().len() >= 4).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[..4], ["alpha", "bravo", "charlie", "alpha"]);
}

/// Integration test: each reply hangs off the message before it
#[tokio::test]
async fn test_replies_form_a_chain() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.start(CHAT).await;

    wait_until("two turns", || f.speakers().len() >= 2).await;
    f.registry.stop(CHAT).await;

    let messages = f.store.messages(CHAT);
    assert_eq!(messages[1].parent_id.as_deref(), Some(messages[0].id.as_str()));
    assert_eq!(messages[2].parent_id.as_deref(), Some(messages[1].id.as_str()));
    assert!(messages[0].children_ids.contains(&messages[1].id));
}

/// Integration test: a tag in the latest message beats round robin
#[tokio::test]
async fn test_tag_takes_precedence() {
    let f = fixture(trio(), "What do you think, @charlie?");
    f.registry.start(CHAT).await;

    wait_until("two turns", || f.speakers().len() >= 2).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[..2], ["charlie", "alpha"]);
}

/// Integration test: an override is used by exactly one selection
#[tokio::test]
async fn test_override_is_single_use() {
    let f = fixture(trio(), "Is free will real?");
    f.start_paused_then(trio(), |r| r.set_next_speaker(CHAT, "charlie")).await;

    wait_until("three turns", || f.speakers().len() >= 3).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[..3], ["charlie", "alpha", "bravo"]);
}

/// Integration test: a muted participant is never selected
#[tokio::test]
async fn test_muted_participant_is_skipped() {
    let f = fixture(trio(), "Is free will real?");
    f.start_paused_then(trio(), |r| r.set_bot_state(CHAT, "bravo", BotState::Muted)).await;

    wait_until("four turns", || f.speakers().len() >= 4).await;
    f.registry.stop(CHAT).await;

    assert!(!f.speakers().iter().any(|s| s == "bravo"));
    assert!(f.generator.requests_for("bravo").is_empty());
}

/// Integration test: nobody speaks while every participant is muted
#[tokio::test]
async fn test_all_muted_is_silent() {
    let config = json!({"models": ["alpha", "bravo"]});
    let f = fixture(config.clone(), "Anyone?");
    f.start_paused_then(config, |r| {
        r.set_bot_state(CHAT, "alpha", BotState::Muted);
        r.set_bot_state(CHAT, "bravo", BotState::Muted);
    })
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(f.speakers().is_empty());
    assert!(f.generator.requests().is_empty());

    f.registry.set_bot_state(CHAT, "bravo", BotState::Active);
    f.registry.notify(CHAT);
    wait_until("bravo to speak", || !f.speakers().is_empty()).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[0], "bravo");
}

/// Integration test: the circuit opens on the third consecutive failure and
/// the next participant takes over
#[tokio::test]
async fn test_circuit_opens_after_three_failures() {
    let config = json!({"models": ["alpha", "bravo"]});
    let f = fixture(config, "Begin.");
    f.generator.always("alpha", MockReply::Fail("upstream down".to_string()));
    f.registry.start(CHAT).await;

    wait_until("bravo to speak", || !f.speakers().is_empty()).await;
    assert_eq!(f.registry.error_count(CHAT, "alpha"), 3);
    f.registry.stop(CHAT).await;

    assert!(f.speakers().iter().all(|s| s == "bravo"));

    let failures: Vec<Option<bool>> = f
        .sink
        .by_topic(topics::STATUS)
        .into_iter()
        .filter_map(|e| match e {
            SymposiumEvent::Status {
                model,
                error: true,
                circuit_open,
                ..
            } if model == "alpha" => Some(circuit_open),
            _ => None,
        })
        .collect();

    assert_eq!(failures, vec![Some(false), Some(false), Some(true)]);
    assert_eq!(f.generator.requests_for("alpha").len(), 3);
}

/// Integration test: a whisper reaches exactly one prompt
#[tokio::test]
async fn test_whisper_is_single_use() {
    let config = json!({"models": ["alpha", "bravo"]});
    let f = fixture(config.clone(), "Begin.");
    f.start_paused_then(config, |r| r.add_whisper(CHAT, "alpha", "Be brief.")).await;

    wait_until("alpha twice", || f.generator.requests_for("alpha").len() >= 2).await;
    f.registry.stop(CHAT).await;

    let requests = f.generator.requests_for("alpha");
    let instruction = "Private Instruction for alpha: Be brief.";
    assert!(requests[0].system_prompt().unwrap_or_default().contains(instruction));
    assert!(!requests[1].system_prompt().unwrap_or_default().contains(instruction));
    assert!(!f.generator.requests_for("bravo")[0]
        .system_prompt()
        .unwrap_or_default()
        .contains("Private Instruction"));
}

/// Integration test: speaking history keeps only the newest entries
#[tokio::test]
async fn test_speaking_history_is_bounded() {
    let mut settings = settings();
    settings.history_capacity = 3;
    let f = fixture_with(json!({"models": ["alpha", "bravo"]}), "Begin.", settings);
    f.registry.start(CHAT).await;

    wait_until("six turns", || f.speakers().len() >= 6).await;
    let total: usize = f
        .registry
        .speaking_stats(CHAT)
        .values()
        .map(|s| s.message_count)
        .sum();
    f.registry.stop(CHAT).await;

    assert_eq!(total, 3);
}

/// Integration test: archiving the conversation stops its symposium
#[tokio::test]
async fn test_archived_conversation_stops() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.start(CHAT).await;
    wait_until("first turn", || !f.speakers().is_empty()).await;

    f.store.set_archived(CHAT, true).unwrap();
    f.registry.notify(CHAT);

    wait_until("auto stop", || !f.registry.is_active(CHAT)).await;
    wait_until("stopped event", || !f.sink.by_topic(topics::STOPPED).is_empty()).await;
    assert!(f.registry.active_symposiums().is_empty());
}

/// Integration test: stop is idempotent and silences the loop
#[tokio::test]
async fn test_stop_is_idempotent() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.start(CHAT).await;
    f.registry.start(CHAT).await;
    wait_until("first turn", || !f.speakers().is_empty()).await;

    f.registry.stop(CHAT).await;
    f.registry.stop(CHAT).await;
    let spoken = f.speakers().len();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.speakers().len(), spoken);
    assert!(!f.registry.is_active(CHAT));
    assert_eq!(f.sink.by_topic(topics::STARTED).len(), 1);
    assert_eq!(f.sink.by_topic(topics::STOPPED).len(), 1);
    assert_eq!(f.registry.current_speaker(CHAT), None);
}

/// Integration test: spliced lines are part of the next speaker's context
#[tokio::test]
async fn test_splice_enters_context() {
    let f = fixture(json!({"models": ["alpha"]}), "Begin.");
    assert!(f.registry.splice_message(CHAT, "Thunder rolls").await);
    assert!(!f.registry.splice_message("chat-404", "Silence").await);

    f.registry.start(CHAT).await;
    wait_until("first turn", || !f.generator.requests_for("alpha").is_empty()).await;
    f.registry.stop(CHAT).await;

    let request = &f.generator.requests_for("alpha")[0];
    assert_eq!(request.messages.last().map(|m| m.content.as_str()), Some("[Echo]: _Thunder rolls_"));
}

/// Integration test: an absurd interval is clamped and the first turn still happens
#[tokio::test]
async fn test_out_of_range_interval_still_speaks() {
    let f = fixture_with(
        json!({"models": ["alpha"], "autonomous_interval": 1e30}),
        "Begin.",
        SchedulerSettings::default(),
    );
    f.registry.start(CHAT).await;

    wait_until("first turn", || !f.speakers().is_empty()).await;
    assert!(f.registry.is_active(CHAT));
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers(), vec!["alpha"]);
    assert!(!f.registry.is_active(CHAT));
}

/// Integration test: garbled config values fall back to defaults
#[tokio::test]
async fn test_garbled_config_uses_defaults() {
    let f = fixture(
        json!({"models": ["alpha", "bravo"], "autonomous_interval": "soon", "context_limit": "lots"}),
        "Begin.",
    );
    f.registry.start(CHAT).await;

    wait_until("two turns", || f.speakers().len() >= 2).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[..2], ["alpha", "bravo"]);
    let request = &f.generator.requests_for("bravo")[0];
    assert_eq!(request.messages.len(), 3);
}

/// Integration test: a zero context limit sends only the system line and
/// leaves the reply without a parent
#[tokio::test]
async fn test_zero_context_limit() {
    let f = fixture(json!({"models": ["alpha"], "context_limit": 0}), "Begin.");
    f.registry.start(CHAT).await;

    wait_until("first turn", || !f.speakers().is_empty()).await;
    f.registry.stop(CHAT).await;

    let request = &f.generator.requests_for("alpha")[0];
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, Role::System);

    let messages = f.store.messages(CHAT);
    let reply = messages.iter().find(|m| m.role == Role::Assistant).unwrap();
    assert!(reply.parent_id.is_none());
    let opening = messages.iter().find(|m| m.content == "Begin.").unwrap();
    assert!(opening.children_ids.is_empty());
}

/// Integration test: controls sent before start shape the first turn
#[tokio::test]
async fn test_controls_before_start_are_kept() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.set_next_speaker(CHAT, "bravo");
    f.registry.add_whisper(CHAT, "bravo", "Take the contrarian side.");
    f.registry.start(CHAT).await;

    wait_until("two turns", || f.speakers().len() >= 2).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[..2], ["bravo", "charlie"]);
    let prompt = f.generator.requests_for("bravo")[0].system_prompt().unwrap_or_default().to_string();
    assert!(prompt.contains("Private Instruction for bravo: Take the contrarian side."));
}

/// Integration test: controls sent to a stopped symposium do not survive stop
#[tokio::test]
async fn test_stop_discards_held_controls() {
    let f = fixture(trio(), "Is free will real?");
    f.registry.set_next_speaker(CHAT, "charlie");
    f.registry.add_whisper(CHAT, "alpha", "Stay quiet.");
    f.registry.stop(CHAT).await;

    f.registry.start(CHAT).await;
    wait_until("first turn", || !f.speakers().is_empty()).await;
    f.registry.stop(CHAT).await;

    assert_eq!(f.speakers()[0], "alpha");
    let prompt = f.generator.requests_for("alpha")[0].system_prompt().unwrap_or_default().to_string();
    assert!(!prompt.contains("Private Instruction"));
}
