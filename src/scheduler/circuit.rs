//! Per-participant circuit breaker.
//!
//! Counts consecutive generation failures. Once a participant reaches the
//! threshold its circuit is open and automatic selection skips it; an explicit
//! tag or override can still pick it. A single success closes the circuit.

use std::collections::HashMap;

use super::settings::MAX_CONSECUTIVE_ERRORS;

/// Consecutive-failure counters for one symposium.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    counts: HashMap<String, u32>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: HashMap::new(),
        }
    }

    /// Record a failed generation; returns the new consecutive count.
    pub fn record_failure(&mut self, model: &str) -> u32 {
        let count = self.counts.entry(model.to_string()).or_insert(0);
        *count += 1;

        if *count == self.threshold {
            tracing::warn!(model = %model, failures = *count, "Circuit breaker opened");
        }

        *count
    }

    /// Record a successful generation, closing the circuit.
    pub fn record_success(&mut self, model: &str) {
        if let Some(count) = self.counts.get_mut(model) {
            *count = 0;
        }
    }

    pub fn count(&self, model: &str) -> u32 {
        self.counts.get(model).copied().unwrap_or(0)
    }

    pub fn is_open(&self, model: &str) -> bool {
        self.count(model) >= self.threshold
    }

    /// Whether a given count would open the circuit
    pub fn opens_at(&self, count: u32) -> bool {
        count >= self.threshold
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(MAX_CONSECUTIVE_ERRORS)
    }
}
