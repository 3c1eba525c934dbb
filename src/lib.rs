//! Symposium - turn-taking scheduler for autonomous multi-model conversations
//!
//! Several language-model participants take turns speaking in one shared
//! conversation. A per-conversation loop picks the next speaker, composes its
//! prompt from recent history, generates a reply, persists it into the
//! message tree and broadcasts it. Operators steer the exchange with speaker
//! overrides, private whispers, participation states and wake signals.

pub mod compose;
pub mod domain;
pub mod error;
pub mod events;
pub mod id;
pub mod llm;
pub mod portable;
pub mod scheduler;
pub mod store;

pub use error::{Result, SymposiumError};
