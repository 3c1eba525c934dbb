//! Message Composer - turn a conversation into one participant's prompt
//!
//! The prompt is a single system message followed by the most recent context
//! messages, each rendered as a user-role line `[<author>]: <content>` so every
//! participant sees the whole exchange from the same vantage point.

mod persist;

use std::time::Duration;

pub use persist::{persist_message, persist_response, splice_echo};

use crate::domain::{ChatMessage, Conversation, SymposiumConfig};
use crate::llm::PromptMessage;
use crate::scheduler::SchedulerSettings;

/// Conversation messages in order, trimmed to the recent window once the tree
/// grows past `recent_window_threshold`.
pub fn sorted_context(conversation: &Conversation, now: i64, settings: &SchedulerSettings) -> Vec<ChatMessage> {
    let sorted = conversation.sorted_messages();

    if sorted.len() <= settings.recent_window_threshold {
        return sorted.into_iter().cloned().collect();
    }

    let cutoff = now - window_secs(settings.recent_window);
    sorted
        .into_iter()
        .filter(|m| m.timestamp > cutoff)
        .cloned()
        .collect()
}

fn window_secs(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX)
}

/// The last `limit` messages of an ordered context
pub fn context_tail(messages: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    &messages[messages.len().saturating_sub(limit)..]
}

/// System line: prompt, participant list and an optional private instruction.
pub fn system_content(config: &SymposiumConfig, model: &str, whisper: Option<&str>) -> String {
    let mut content = format!("{}\n\nParticipants: {}", config.prompt, config.models.join(", "));
    if let Some(whisper) = whisper {
        content.push_str(&format!("\n\nPrivate Instruction for {}: {}", model, whisper));
    }
    content
}

pub fn render_line(message: &ChatMessage) -> String {
    format!("[{}]: {}", message.author(), message.content)
}

/// Build the full prompt for `model`. `context` must already be trimmed to the
/// context limit.
pub fn compose_turn(
    config: &SymposiumConfig,
    model: &str,
    whisper: Option<&str>,
    context: &[ChatMessage],
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(context.len() + 1);
    messages.push(PromptMessage::system(system_content(config, model, whisper)));
    messages.extend(context.iter().map(|m| PromptMessage::user(render_line(m))));
    messages
}
