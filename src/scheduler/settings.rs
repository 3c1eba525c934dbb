//! Tunables for the scheduler loop.

use std::time::Duration;

/// Floor applied to a symposium's `autonomous_interval`
pub const MIN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
/// Ceiling applied to a symposium's `autonomous_interval`
pub const MAX_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_CONTEXT_LIMIT: usize = 20;
/// Consecutive failures that open a participant's circuit
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;
/// Speaking history entries retained per symposium
pub const MAX_SPEAKING_HISTORY: usize = 1000;

/// Scheduler settings shared by every symposium loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub default_interval_secs: u64,
    pub default_context_limit: usize,
    pub max_consecutive_errors: u32,
    pub history_capacity: usize,
    /// Pause after a failed generation
    pub error_backoff: Duration,
    /// Upper bound on the wait while a symposium is paused
    pub paused_wait: Duration,
    /// Only messages newer than this are considered once the tree is large
    pub recent_window: Duration,
    /// Message count above which the recent window applies
    pub recent_window_threshold: usize,
    /// Multiplies every interval; lets tests run loops in milliseconds
    pub time_scale: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: MIN_INTERVAL_SECS,
            max_interval_secs: MAX_INTERVAL_SECS,
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            default_context_limit: DEFAULT_CONTEXT_LIMIT,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            history_capacity: MAX_SPEAKING_HISTORY,
            error_backoff: Duration::from_secs(5),
            paused_wait: Duration::from_secs(3600),
            recent_window: Duration::from_secs(3600),
            recent_window_threshold: 50,
            time_scale: 1.0,
        }
    }
}

impl SchedulerSettings {
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Apply the time scale to a nominal duration, saturating at `Duration::MAX`
    pub fn scaled(&self, duration: Duration) -> Duration {
        let secs = duration.as_secs_f64() * self.time_scale.max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
