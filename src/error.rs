//! Error types for Symposium
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in the symposium scheduler
#[derive(Debug, Error)]
pub enum SymposiumError {
    /// Conversation, message or user not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generation collaborator error
    #[error("Generation error: {0}")]
    Generation(String),

    /// Symposium config could not be used
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Operation abandoned because the symposium was stopped
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for symposium operations
pub type Result<T> = std::result::Result<T, SymposiumError>;
