//! Symposium configuration as stored on the conversation.
//!
//! The config is free-form JSON edited by clients, so parsing is lenient:
//! missing or malformed fields fall back to the scheduler defaults.

use std::time::Duration;

use serde_json::Value;

use crate::scheduler::SchedulerSettings;

pub const DEFAULT_PROMPT: &str = "You are in a symposium.";

/// Per-iteration view of a symposium's settings
#[derive(Debug, Clone, PartialEq)]
pub struct SymposiumConfig {
    pub mode: Option<String>,
    pub models: Vec<String>,
    pub interval_secs: u64,
    pub context_limit: usize,
    pub prompt: String,
    pub paused: bool,
}

impl SymposiumConfig {
    /// Parse a conversation config, clamping the interval between the configured
    /// floor and ceiling
    pub fn from_value(config: &Value, settings: &SchedulerSettings) -> Self {
        let interval = number_field(config, "autonomous_interval")
            .map(|n| n.max(0.0) as u64)
            .unwrap_or(settings.default_interval_secs);

        let context_limit = number_field(config, "context_limit")
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(settings.default_context_limit);

        let models = config
            .get("models")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let prompt = config
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROMPT)
            .to_string();

        Self {
            mode: config.get("mode").and_then(Value::as_str).map(str::to_string),
            models,
            interval_secs: interval.min(settings.max_interval_secs).max(settings.min_interval_secs),
            context_limit,
            prompt,
            paused: config.get("paused").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn index_of(&self, model: &str) -> Option<usize> {
        self.models.iter().position(|m| m == model)
    }
}

fn number_field(config: &Value, key: &str) -> Option<f64> {
    match config.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
