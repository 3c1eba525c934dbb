//! Conversation snapshot and message tree types.
//!
//! Messages form a tree through `parent_id` / `children_ids`. Field names
//! serialize in camelCase to match the stored chat history format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{generate_message_id, now_secs};

/// Author role of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

/// A single node in a conversation's message tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatMessage {
    pub id: String,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub role: Role,
    pub content: String,
    pub model: Option<String>,
    pub model_name: Option<String>,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub done: bool,
}

impl ChatMessage {
    /// An empty message with only an id, used as the base for partial upserts
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            done: true,
            ..Default::default()
        }
    }

    /// A user-authored message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            role: Role::User,
            content: content.into(),
            timestamp: now_secs(),
            done: true,
            ..Default::default()
        }
    }

    /// An assistant response from a participant
    pub fn assistant(model: &str, content: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: generate_message_id(),
            parent_id,
            role: Role::Assistant,
            content: content.into(),
            model: Some(model.to_string()),
            model_name: Some(model.to_string()),
            timestamp: now_secs(),
            done: true,
            ..Default::default()
        }
    }

    /// A system "echo" line spliced into the thread by an operator
    pub fn echo(content: &str, parent_id: Option<String>) -> Self {
        Self {
            id: generate_message_id(),
            parent_id,
            role: Role::System,
            content: format!("_{}_", content),
            model: Some("system_echo".to_string()),
            model_name: Some("Echo".to_string()),
            timestamp: now_secs(),
            kind: Some("echo".to_string()),
            done: true,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Display name used when rendering this message into a prompt
    pub fn author(&self) -> &str {
        if self.role == Role::User {
            return "User";
        }
        self.model_name
            .as_deref()
            .or(self.model.as_deref())
            .unwrap_or("User")
    }
}

/// Partial message update; only fields that are `Some` overwrite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub parent_id: Option<Option<String>>,
    pub children_ids: Option<Vec<String>>,
    pub role: Option<Role>,
    pub content: Option<String>,
    pub model: Option<Option<String>>,
    pub model_name: Option<Option<String>>,
    pub timestamp: Option<i64>,
    pub kind: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub done: Option<bool>,
}

impl MessagePatch {
    /// A patch that replaces every field
    pub fn full(message: &ChatMessage) -> Self {
        Self {
            parent_id: Some(message.parent_id.clone()),
            children_ids: Some(message.children_ids.clone()),
            role: Some(message.role),
            content: Some(message.content.clone()),
            model: Some(message.model.clone()),
            model_name: Some(message.model_name.clone()),
            timestamp: Some(message.timestamp),
            kind: Some(message.kind.clone()),
            error: Some(message.error.clone()),
            done: Some(message.done),
        }
    }

    /// A patch touching only the child list
    pub fn children(children_ids: Vec<String>) -> Self {
        Self {
            children_ids: Some(children_ids),
            ..Default::default()
        }
    }

    pub fn apply(self, message: &mut ChatMessage) {
        if let Some(v) = self.parent_id {
            message.parent_id = v;
        }
        if let Some(v) = self.children_ids {
            message.children_ids = v;
        }
        if let Some(v) = self.role {
            message.role = v;
        }
        if let Some(v) = self.content {
            message.content = v;
        }
        if let Some(v) = self.model {
            message.model = v;
        }
        if let Some(v) = self.model_name {
            message.model_name = v;
        }
        if let Some(v) = self.timestamp {
            message.timestamp = v;
        }
        if let Some(v) = self.kind {
            message.kind = v;
        }
        if let Some(v) = self.error {
            message.error = v;
        }
        if let Some(v) = self.done {
            message.done = v;
        }
    }
}

/// Snapshot of a conversation as read from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub archived: bool,
    pub mode: String,
    /// Raw symposium config; parsed fresh each iteration
    pub config: Value,
    pub messages: HashMap<String, ChatMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            mode: "symposium".to_string(),
            config: Value::Object(Default::default()),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    /// Messages in conversation order.
    ///
    /// Timestamps have one-second resolution, so ties are broken by depth in
    /// the parent chain and then by id.
    pub fn sorted_messages(&self) -> Vec<&ChatMessage> {
        let mut sorted: Vec<(&ChatMessage, usize)> = self.messages.values().map(|m| (m, self.depth(m))).collect();
        sorted.sort_by(|(a, da), (b, db)| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(da.cmp(db))
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted.into_iter().map(|(m, _)| m).collect()
    }

    /// The most recent message in conversation order
    pub fn latest_message(&self) -> Option<&ChatMessage> {
        self.sorted_messages().pop()
    }

    /// Number of ancestors reachable through `parent_id`; bounded so a corrupt
    /// cycle cannot loop forever.
    fn depth(&self, message: &ChatMessage) -> usize {
        let mut depth = 0;
        let mut parent = message.parent_id.as_deref();
        while let Some(id) = parent {
            if depth >= self.messages.len() {
                break;
            }
            match self.messages.get(id) {
                Some(m) => {
                    depth += 1;
                    parent = m.parent_id.as_deref();
                }
                None => break,
            }
        }
        depth
    }
}

/// Owner of a conversation, passed through to the generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: "user".to_string(),
        }
    }
}
