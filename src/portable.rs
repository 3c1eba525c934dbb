//! Portable symposium configuration files.
//!
//! An export captures the participant list and pacing of a conversation so it
//! can be re-applied to another one. Files are versioned JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::Conversation;
use crate::error::{Result, SymposiumError};
use crate::id::now_ms;
use crate::scheduler::{DEFAULT_CONTEXT_LIMIT, DEFAULT_INTERVAL_SECS};

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymposiumExport {
    pub version: String,
    pub name: String,
    pub description: String,
    pub config: ExportedConfig,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedConfig {
    pub models: Vec<String>,
    pub prompt: String,
    pub autonomous_interval: u64,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default)]
    pub paused: bool,
}

fn default_context_limit() -> usize {
    DEFAULT_CONTEXT_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Unix milliseconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Numbers that are zero or missing fall back to the default, like any other
/// unset field.
fn positive(config: &Value, key: &str) -> Option<u64> {
    config.get(key).and_then(Value::as_f64).filter(|n| *n > 0.0).map(|n| n as u64)
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|s| !s.is_empty())
}

/// Capture the symposium settings of `conversation`.
pub fn export_config(conversation: &Conversation, name: Option<&str>) -> SymposiumExport {
    let config = &conversation.config;
    let title = non_empty(&conversation.title);

    SymposiumExport {
        version: EXPORT_VERSION.to_string(),
        name: name
            .and_then(non_empty)
            .or(title)
            .unwrap_or("Symposium Configuration")
            .to_string(),
        description: format!("Exported from {}", title.unwrap_or("Untitled Symposium")),
        config: ExportedConfig {
            models: config
                .get("models")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            prompt: config.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string(),
            autonomous_interval: positive(config, "autonomous_interval").unwrap_or(DEFAULT_INTERVAL_SECS),
            context_limit: positive(config, "context_limit")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_CONTEXT_LIMIT),
            paused: config.get("paused").and_then(Value::as_bool).unwrap_or(false),
        },
        metadata: ExportMetadata {
            created_at: now_ms(),
            author: Some("User".to_string()),
        },
    }
}

/// Structural check of an export document.
pub fn validate(value: &Value) -> bool {
    let Some(doc) = value.as_object() else {
        return false;
    };
    let has_version = doc
        .get("version")
        .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
    let Some(config) = doc.get("config").and_then(Value::as_object) else {
        return false;
    };

    has_version
        && config
            .get("models")
            .and_then(Value::as_array)
            .is_some_and(|m| !m.is_empty())
        && config.get("prompt").is_some_and(Value::is_string)
        && config.get("autonomous_interval").is_some_and(Value::is_number)
}

/// Parse and validate an export document.
pub fn import_config(raw: &str) -> Result<SymposiumExport> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| SymposiumError::InvalidConfig(format!("Failed to parse configuration file: {}", e)))?;

    if !validate(&value) {
        return Err(SymposiumError::InvalidConfig(
            "Invalid symposium configuration file".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| SymposiumError::InvalidConfig(format!("Invalid symposium configuration file: {}", e)))
}

/// Download name: lowercase, runs of whitespace or path separators replaced
/// by `_`, so the result is always a single path component.
pub fn file_name(export: &SymposiumExport) -> String {
    let name = export
        .name
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '\\' | ':'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_config.json", name)
}

impl SymposiumExport {
    /// Merge the exported settings into an existing conversation config,
    /// keeping keys the export does not carry.
    pub fn apply_to(&self, config: &Value) -> Value {
        let mut merged = config.as_object().cloned().unwrap_or_else(Map::new);
        merged.insert("models".to_string(), json!(self.config.models));
        merged.insert("prompt".to_string(), json!(self.config.prompt));
        merged.insert("autonomous_interval".to_string(), json!(self.config.autonomous_interval));
        merged.insert("context_limit".to_string(), json!(self.config.context_limit));
        merged.insert("paused".to_string(), json!(self.config.paused));
        Value::Object(merged)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
