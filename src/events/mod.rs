//! Event delivery. Emission is fire-and-forget: a sink never fails the caller
//! and never blocks on slow consumers.

use std::sync::{Mutex, PoisonError};

use log::info;
use tokio::sync::broadcast;

use crate::domain::SymposiumEvent;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Receives every event the scheduler emits.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SymposiumEvent);
}

/// Fans events out to any number of subscribers.
///
/// Subscribers that fall behind lose the oldest events; with no subscribers
/// events are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SymposiumEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SymposiumEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: SymposiumEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes each event to the log as `topic payload`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: SymposiumEvent) {
        info!("{} {}", event.topic(), event.payload());
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SymposiumEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SymposiumEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events published under `topic`
    pub fn by_topic(&self, topic: &str) -> Vec<SymposiumEvent> {
        self.events().into_iter().filter(|e| e.topic() == topic).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SymposiumEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}
