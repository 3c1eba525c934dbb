//! In-process store backed by a `RwLock`ed map.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::{ConversationStore, UserStore};
use crate::domain::{ChatMessage, Conversation, MessagePatch, User};
use crate::error::{Result, SymposiumError};

#[derive(Debug, Default)]
struct Tables {
    conversations: HashMap<String, Conversation>,
    users: HashMap<String, User>,
}

/// Conversations and users kept in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|e| SymposiumError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|e| SymposiumError::Storage(e.to_string()))
    }

    /// Insert or replace a conversation.
    pub fn insert_conversation(&self, conversation: Conversation) {
        if let Ok(mut tables) = self.write() {
            tables.conversations.insert(conversation.id.clone(), conversation);
        }
    }

    pub fn insert_user(&self, user: User) {
        if let Ok(mut tables) = self.write() {
            tables.users.insert(user.id.clone(), user);
        }
    }

    pub fn set_config(&self, conversation_id: &str, config: Value) -> Result<()> {
        let mut tables = self.write()?;
        let conv = tables
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| SymposiumError::NotFound(format!("conversation {}", conversation_id)))?;
        conv.config = config;
        Ok(())
    }

    pub fn set_archived(&self, conversation_id: &str, archived: bool) -> Result<()> {
        let mut tables = self.write()?;
        let conv = tables
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| SymposiumError::NotFound(format!("conversation {}", conversation_id)))?;
        conv.archived = archived;
        Ok(())
    }

    pub fn remove_conversation(&self, conversation_id: &str) {
        if let Ok(mut tables) = self.write() {
            tables.conversations.remove(conversation_id);
        }
    }

    /// Messages of a conversation in conversation order
    pub fn messages(&self, conversation_id: &str) -> Vec<ChatMessage> {
        let Ok(tables) = self.read() else {
            return Vec::new();
        };
        tables
            .conversations
            .get(conversation_id)
            .map(|c| c.sorted_messages().into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl ConversationStore for MemoryStore {
    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.read()?.conversations.get(id).cloned())
    }

    fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<Option<ChatMessage>> {
        Ok(self
            .read()?
            .conversations
            .get(conversation_id)
            .and_then(|c| c.messages.get(message_id))
            .cloned())
    }

    fn upsert_message(&self, conversation_id: &str, message_id: &str, patch: MessagePatch) -> Result<()> {
        let mut tables = self.write()?;
        let conv = tables
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| SymposiumError::NotFound(format!("conversation {}", conversation_id)))?;
        let message = conv
            .messages
            .entry(message_id.to_string())
            .or_insert_with(|| ChatMessage::empty(message_id));
        patch.apply(message);
        Ok(())
    }
}

impl UserStore for MemoryStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.read()?.users.get(id).cloned())
    }
}
