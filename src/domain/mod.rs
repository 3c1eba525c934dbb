//! Domain types for Symposium
//!
//! - BotState: per-participant participation state
//! - ChatMessage / Conversation / User: the message tree and its owner
//! - SymposiumConfig: per-iteration settings parsed from conversation config
//! - SymposiumEvent: broadcast notifications

pub mod bot_state;
pub mod event;
pub mod message;
pub mod symposium;

pub use bot_state::BotState;
pub use event::{STATUS_GENERATING, SymposiumEvent, topics};
pub use message::{ChatMessage, Conversation, MessagePatch, Role, User};
pub use symposium::{DEFAULT_PROMPT, SymposiumConfig};
