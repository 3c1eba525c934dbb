//! ID and clock utilities
//!
//! Message ids are UUID v4 strings; timestamps are Unix seconds, matching the
//! message tree format.

use uuid::Uuid;

/// Current timestamp in seconds since Unix epoch
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a unique message ID
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}
