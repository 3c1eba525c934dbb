//! Participant state within a symposium.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SymposiumError;

/// How a participant takes part in the conversation.
///
/// The scheduler only ever moves a participant into `Speaking` when its turn
/// starts and back to `Active` when the turn ends. `Listening` and `Muted`
/// are applied externally and are not restored after a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    /// Participates in round robin
    #[default]
    Active,
    /// Observes; speaks only when tagged or forced
    Listening,
    /// Never selected, even when tagged
    Muted,
    /// Generation in flight
    Speaking,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Active => "active",
            BotState::Listening => "listening",
            BotState::Muted => "muted",
            BotState::Speaking => "speaking",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BotState::Active)
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotState {
    type Err = SymposiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(BotState::Active),
            "listening" => Ok(BotState::Listening),
            "muted" => Ok(BotState::Muted),
            "speaking" => Ok(BotState::Speaking),
            other => Err(SymposiumError::InvalidConfig(format!("unknown bot state: {}", other))),
        }
    }
}
