//! Generation collaborator types and trait definitions

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Role, User};
use crate::error::Result;

/// One message of a composed prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A request for one participant's turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(rename = "chat_id")]
    pub conversation_id: String,
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(conversation_id: &str, model: &str, messages: Vec<PromptMessage>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            model: model.to_string(),
            messages,
            stream: false,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

/// Raw text fragments of a streamed response. Each item may carry one or more
/// SSE lines (`data: {...}`) or a bare JSON payload.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What a generator hands back; normalized by [`super::accumulate`]
pub enum GenerationOutput {
    /// A complete chat-completion payload
    Complete(Value),
    /// An incremental stream of fragments
    Stream(FragmentStream),
}

impl std::fmt::Debug for GenerationOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(value) => f.debug_tuple("Complete").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Produces one participant's reply. Failures must surface as errors, never as
/// silently empty content.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest, user: &User) -> Result<GenerationOutput>;
}
