//! Writing new messages into the conversation tree.

use std::sync::Arc;

use crate::domain::{ChatMessage, MessagePatch};
use crate::error::Result;
use crate::store::{ConversationStore, blocking};

/// Upsert `message`, then append its id to the parent's children.
///
/// The two writes are separate; a concurrent writer to the same parent can
/// lose a child link.
pub async fn persist_message(
    store: &Arc<dyn ConversationStore>,
    conversation_id: &str,
    message: ChatMessage,
) -> Result<ChatMessage> {
    let conv_id = conversation_id.to_string();
    let saved = message.clone();
    blocking(store, move |s| s.upsert_message(&conv_id, &saved.id, MessagePatch::full(&saved))).await?;

    if let Some(parent_id) = message.parent_id.clone() {
        let conv_id = conversation_id.to_string();
        let child_id = message.id.clone();
        blocking(store, move |s| {
            let mut children = s
                .get_message(&conv_id, &parent_id)?
                .map(|p| p.children_ids)
                .unwrap_or_default();
            if !children.contains(&child_id) {
                children.push(child_id);
            }
            s.upsert_message(&conv_id, &parent_id, MessagePatch::children(children))
        })
        .await?;
    }

    Ok(message)
}

/// Persist a participant's reply as a child of `parent`.
pub async fn persist_response(
    store: &Arc<dyn ConversationStore>,
    conversation_id: &str,
    model: &str,
    content: &str,
    parent: Option<&ChatMessage>,
) -> Result<ChatMessage> {
    let message = ChatMessage::assistant(model, content, parent.map(|p| p.id.clone()));
    persist_message(store, conversation_id, message).await
}

/// Append an echo line after the conversation's latest message. Returns
/// `None` when the conversation does not exist.
pub async fn splice_echo(
    store: &Arc<dyn ConversationStore>,
    conversation_id: &str,
    content: &str,
) -> Result<Option<ChatMessage>> {
    let conv_id = conversation_id.to_string();
    let Some(conversation) = blocking(store, move |s| s.get_conversation(&conv_id)).await? else {
        return Ok(None);
    };

    let parent = conversation.latest_message().map(|m| m.id.clone());
    let message = persist_message(store, conversation_id, ChatMessage::echo(content, parent)).await?;
    Ok(Some(message))
}
