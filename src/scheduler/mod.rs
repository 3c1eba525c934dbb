//! Scheduler module for symposium turn-taking.
//!
//! This module provides:
//! - **Turn selection**: override, `@tag` and round-robin precedence, filtered
//!   by circuit breaker and bot state.
//! - **Circuit breaker**: per-participant consecutive failure counting.
//! - **Speaking history**: bounded log of successful turns and derived stats.
//! - **Wake signal**: cuts a loop's wait short after a control operation.
//! - **SymposiumRegistry**: starts, stops and controls one loop per conversation.
//!
//! # Architecture
//!
//! Each running symposium is one tokio task:
//! 1. Re-read the conversation and its config
//! 2. Select the next speaker
//! 3. Compose the prompt, generate, persist and broadcast the reply
//! 4. Wait for the interval or a wake signal
//!
//! # Example
//!
//! ```ignore
//! use symposium::scheduler::{SchedulerSettings, SymposiumRegistry};
//!
//! let registry = SymposiumRegistry::new(store.clone(), store, generator, sink, SchedulerSettings::default());
//! registry.start("chat-1").await;
//! registry.set_next_speaker("chat-1", "alpha");
//! registry.stop("chat-1").await;
//! ```

mod circuit;
mod history;
mod registry;
mod runtime;
mod select;
mod settings;
mod tags;
mod turn_loop;
mod wake;

pub use circuit::CircuitBreaker;
pub use history::{SpeakerStats, SpeakingEntry, SpeakingHistory, word_count};
pub use registry::SymposiumRegistry;
pub use runtime::SymposiumRuntime;
pub use select::{Selection, SelectionSource, TurnSelector};
pub use settings::{
    DEFAULT_CONTEXT_LIMIT, DEFAULT_INTERVAL_SECS, MAX_CONSECUTIVE_ERRORS, MAX_INTERVAL_SECS, MAX_SPEAKING_HISTORY,
    MIN_INTERVAL_SECS, SchedulerSettings,
};
pub use tags::{extract_tags, match_tag};
pub use turn_loop::LoopExit;
pub use wake::{WakeReason, WakeSignal, sleep_or_cancel};
