//! Events broadcast to clients watching a symposium.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bot_state::BotState;
use super::message::ChatMessage;

/// Event topic constants
pub mod topics {
    pub const STARTED: &str = "symposium:started";
    pub const STOPPED: &str = "symposium:stopped";
    pub const BOT_STATE: &str = "symposium:bot_state";
    pub const STATUS: &str = "symposium:status";
    pub const MESSAGE: &str = "symposium:message";
}

/// Status text emitted when a participant begins generating
pub const STATUS_GENERATING: &str = "Generating...";

/// A fire-and-forget notification about a symposium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SymposiumEvent {
    Started {
        conversation_id: String,
    },
    Stopped {
        conversation_id: String,
    },
    BotState {
        conversation_id: String,
        model: String,
        state: BotState,
    },
    Status {
        conversation_id: String,
        model: String,
        /// `None` clears the status line
        status: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        circuit_open: Option<bool>,
    },
    Message {
        conversation_id: String,
        message: ChatMessage,
    },
}

impl SymposiumEvent {
    pub fn started(conversation_id: &str) -> Self {
        Self::Started {
            conversation_id: conversation_id.to_string(),
        }
    }

    pub fn stopped(conversation_id: &str) -> Self {
        Self::Stopped {
            conversation_id: conversation_id.to_string(),
        }
    }

    pub fn bot_state(conversation_id: &str, model: &str, state: BotState) -> Self {
        Self::BotState {
            conversation_id: conversation_id.to_string(),
            model: model.to_string(),
            state,
        }
    }

    pub fn generating(conversation_id: &str, model: &str) -> Self {
        Self::Status {
            conversation_id: conversation_id.to_string(),
            model: model.to_string(),
            status: Some(STATUS_GENERATING.to_string()),
            error: false,
            circuit_open: None,
        }
    }

    pub fn idle(conversation_id: &str, model: &str) -> Self {
        Self::Status {
            conversation_id: conversation_id.to_string(),
            model: model.to_string(),
            status: None,
            error: false,
            circuit_open: None,
        }
    }

    pub fn failed(conversation_id: &str, model: &str, message: &str, circuit_open: bool) -> Self {
        Self::Status {
            conversation_id: conversation_id.to_string(),
            model: model.to_string(),
            status: Some(format!("Error: {}", message)),
            error: true,
            circuit_open: Some(circuit_open),
        }
    }

    pub fn message(conversation_id: &str, message: ChatMessage) -> Self {
        Self::Message {
            conversation_id: conversation_id.to_string(),
            message,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Self::Started { .. } => topics::STARTED,
            Self::Stopped { .. } => topics::STOPPED,
            Self::BotState { .. } => topics::BOT_STATE,
            Self::Status { .. } => topics::STATUS,
            Self::Message { .. } => topics::MESSAGE,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Started { conversation_id }
            | Self::Stopped { conversation_id }
            | Self::BotState { conversation_id, .. }
            | Self::Status { conversation_id, .. }
            | Self::Message { conversation_id, .. } => conversation_id,
        }
    }

    /// JSON payload without the enum tag, as sent on the wire under `topic()`
    pub fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("event");
        }
        value
    }
}
