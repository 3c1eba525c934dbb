//! Normalize generator output into the final response text.
//!
//! A complete payload is read from `choices[0].message.content` (or a top-level
//! `content`). A stream is folded fragment by fragment: each line may carry a
//! `data: ` prefix, `[DONE]` ends the stream, and a fragment's text comes from
//! `choices[0].delta.content` or `content`. Malformed fragments are skipped.

use futures::StreamExt;
use serde_json::Value;

use super::generator::GenerationOutput;
use crate::error::{Result, SymposiumError};

/// One parsed stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Done,
    /// Nothing to add (blank line, comment, fragment without content)
    Empty,
    Malformed,
}

/// Parse a single SSE line or bare JSON payload.
pub fn parse_fragment(line: &str) -> Fragment {
    let line = line.trim();
    let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);

    if data.is_empty() || data.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") {
        return Fragment::Empty;
    }
    if data == "[DONE]" {
        return Fragment::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Fragment::Malformed,
    };

    let text = if let Some(choices) = value.get("choices") {
        choices
            .get(0)
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
    } else {
        value.get("content").and_then(Value::as_str)
    };

    match text {
        Some(t) if !t.is_empty() => Fragment::Text(t.to_string()),
        _ => Fragment::Empty,
    }
}

/// Extract the text of a complete chat-completion payload.
pub fn complete_text(payload: &Value) -> Result<String> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(SymposiumError::Generation(message));
    }

    let text = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| payload.get("content").and_then(Value::as_str))
        .unwrap_or_default();

    Ok(text.to_string())
}

/// Fold generator output into the full response text.
pub async fn accumulate(output: GenerationOutput) -> Result<String> {
    let mut stream = match output {
        GenerationOutput::Complete(payload) => return complete_text(&payload),
        GenerationOutput::Stream(stream) => stream,
    };

    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for line in chunk.lines() {
            match parse_fragment(line) {
                Fragment::Text(text) => content.push_str(&text),
                Fragment::Done => return Ok(content),
                Fragment::Empty => {}
                Fragment::Malformed => {
                    tracing::debug!(fragment = %line, "Skipping malformed stream fragment");
                }
            }
        }
    }

    Ok(content)
}
