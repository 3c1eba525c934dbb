//! Symposium Registry - owns every running symposium.
//!
//! The registry:
//! 1. Starts and stops one loop task per conversation id
//! 2. Serializes start/stop for the same id behind a per-id async lock
//! 3. Exposes read-only views of runtime state
//! 4. Routes control operations (override, whisper, bot state, wake) to the
//!    running symposium
//!
//! Control operations on an id that is not running never error. Overrides and
//! whispers are held until the next start; `stop` drops them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;

use crate::compose::splice_echo;
use crate::domain::{BotState, SymposiumEvent};
use crate::events::EventSink;
use crate::llm::Generator;
use crate::store::{ConversationStore, UserStore};

use super::history::SpeakerStats;
use super::runtime::SymposiumRuntime;
use super::settings::SchedulerSettings;
use super::turn_loop::{LoopContext, LoopExit, run_symposium};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running symposium task.
struct RunningSymposium {
    runtime: Arc<SymposiumRuntime>,
    handle: Option<JoinHandle<()>>,
}

/// Overrides and whispers received while a symposium is not running
#[derive(Debug, Default)]
struct PendingControls {
    next_speaker: Option<String>,
    whispers: HashMap<String, String>,
}

impl PendingControls {
    fn seed(self, runtime: &SymposiumRuntime) {
        if let Some(model) = self.next_speaker {
            runtime.set_override(&model);
        }
        for (model, text) in self.whispers {
            runtime.add_whisper(&model, &text);
        }
    }
}

/// Registry of running symposiums, shared as `Arc<SymposiumRegistry>`.
pub struct SymposiumRegistry {
    store: Arc<dyn ConversationStore>,
    users: Arc<dyn UserStore>,
    generator: Arc<dyn Generator>,
    sink: Arc<dyn EventSink>,
    settings: SchedulerSettings,
    /// Per-id start/stop locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Lock order: `running` before `pending`
    running: Mutex<HashMap<String, RunningSymposium>>,
    pending: Mutex<HashMap<String, PendingControls>>,
}

impl SymposiumRegistry {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        users: Arc<dyn UserStore>,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn EventSink>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            users,
            generator,
            sink,
            settings,
            locks: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    fn id_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.locks).entry(id.to_string()).or_default().clone()
    }

    /// Drop the lock entry for `id` unless another caller still holds a clone.
    fn release_id_lock(&self, id: &str, id_lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = lock(&self.locks);
        if let Some(current) = locks.get(id)
            && Arc::ptr_eq(current, id_lock)
            && Arc::strong_count(current) <= 2
        {
            locks.remove(id);
        }
    }

    fn runtime(&self, id: &str) -> Option<Arc<SymposiumRuntime>> {
        lock(&self.running).get(id).map(|r| r.runtime.clone())
    }

    /// Start the symposium loop for `id`. Starting a running symposium is a no-op.
    pub async fn start(self: &Arc<Self>, id: &str) {
        let id_lock = self.id_lock(id);
        let _guard = id_lock.lock().await;

        if self.is_active(id) {
            tracing::debug!(conversation_id = %id, "Symposium already running");
            return;
        }

        let runtime = Arc::new(SymposiumRuntime::new(id, &self.settings));
        let ctx = LoopContext {
            runtime: runtime.clone(),
            store: self.store.clone(),
            users: self.users.clone(),
            generator: self.generator.clone(),
            sink: self.sink.clone(),
            settings: self.settings.clone(),
        };

        let registry: Weak<Self> = Arc::downgrade(self);
        let conversation_id = id.to_string();

        let mut running = lock(&self.running);
        if let Some(pending) = lock(&self.pending).remove(id) {
            pending.seed(&runtime);
        }
        let handle = tokio::spawn(async move {
            if run_symposium(ctx).await == LoopExit::ConversationGone
                && let Some(registry) = registry.upgrade()
            {
                // stop() joins this task, so it must run detached
                tokio::spawn(async move { registry.stop(&conversation_id).await });
            }
        });

        running.insert(
            id.to_string(),
            RunningSymposium {
                runtime,
                handle: Some(handle),
            },
        );
        drop(running);

        tracing::info!(conversation_id = %id, "Symposium started");
        self.sink.emit(SymposiumEvent::started(id));
    }

    /// Stop the symposium for `id`, waiting for its task to finish. Stopping a
    /// symposium that is not running is a no-op.
    pub async fn stop(&self, id: &str) {
        let id_lock = self.id_lock(id);
        let guard = id_lock.lock().await;

        let taken = lock(&self.running)
            .get_mut(id)
            .map(|r| (r.runtime.clone(), r.handle.take()));

        lock(&self.pending).remove(id);

        let Some((runtime, handle)) = taken else {
            drop(guard);
            self.release_id_lock(id, &id_lock);
            return;
        };

        runtime.cancel_token().cancel();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(conversation_id = %id, error = ?e, "Symposium task panicked");
        }

        lock(&self.running).remove(id);
        drop(guard);
        self.release_id_lock(id, &id_lock);

        tracing::info!(conversation_id = %id, "Symposium stopped");
        self.sink.emit(SymposiumEvent::stopped(id));
    }

    /// Stop every running symposium.
    pub async fn shutdown(&self) {
        for id in self.active_symposiums() {
            self.stop(&id).await;
        }
    }

    // Reads

    pub fn is_active(&self, id: &str) -> bool {
        lock(&self.running).contains_key(id)
    }

    pub fn active_symposiums(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.running).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn current_speaker(&self, id: &str) -> Option<String> {
        self.runtime(id).and_then(|r| r.current_speaker())
    }

    /// Explicitly set bot states; participants never touched are Active.
    pub fn bot_states(&self, id: &str) -> HashMap<String, BotState> {
        self.runtime(id).map(|r| r.bot_states()).unwrap_or_default()
    }

    pub fn bot_state(&self, id: &str, model: &str) -> BotState {
        self.runtime(id).map(|r| r.bot_state(model)).unwrap_or_default()
    }

    pub fn speaking_stats(&self, id: &str) -> BTreeMap<String, SpeakerStats> {
        self.runtime(id).map(|r| r.speaking_stats()).unwrap_or_default()
    }

    pub fn error_count(&self, id: &str, model: &str) -> u32 {
        self.runtime(id).map(|r| r.error_count(model)).unwrap_or(0)
    }

    // Control operations

    /// Force `model` to speak next and wake the loop. Consumed by one selection.
    /// Held until the next start when the symposium is not running.
    pub fn set_next_speaker(&self, id: &str, model: &str) {
        let running = lock(&self.running);
        match running.get(id) {
            Some(r) => {
                r.runtime.set_override(model);
                r.runtime.wake().set();
            }
            None => {
                tracing::debug!(conversation_id = %id, model = %model, "Override held until start");
                lock(&self.pending).entry(id.to_string()).or_default().next_speaker = Some(model.to_string());
            }
        }
    }

    /// Queue a private instruction for `model`'s next turn and wake the loop.
    /// Held until the next start when the symposium is not running.
    pub fn add_whisper(&self, id: &str, model: &str, text: &str) {
        let running = lock(&self.running);
        match running.get(id) {
            Some(r) => {
                r.runtime.add_whisper(model, text);
                r.runtime.wake().set();
            }
            None => {
                tracing::debug!(conversation_id = %id, model = %model, "Whisper held until start");
                lock(&self.pending)
                    .entry(id.to_string())
                    .or_default()
                    .whispers
                    .insert(model.to_string(), text.to_string());
            }
        }
    }

    /// Cut the current wait short, e.g. after a user message.
    pub fn notify(&self, id: &str) {
        if let Some(runtime) = self.runtime(id) {
            runtime.wake().set();
        }
    }

    /// Bot states start fresh on every start, so a change for a symposium that
    /// is not running is dropped.
    pub fn set_bot_state(&self, id: &str, model: &str, state: BotState) {
        let Some(runtime) = self.runtime(id) else {
            tracing::debug!(conversation_id = %id, "Bot state ignored, symposium not running");
            return;
        };
        runtime.set_bot_state(model, state);
        self.sink.emit(SymposiumEvent::bot_state(id, model, state));
    }

    /// Append an echo line after the latest message. Returns false when the
    /// conversation is missing or the write fails.
    pub async fn splice_message(&self, id: &str, content: &str) -> bool {
        match splice_echo(&self.store, id, content).await {
            Ok(Some(message)) => {
                self.sink.emit(SymposiumEvent::message(id, message));
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(conversation_id = %id, error = %e, "Splice failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for SymposiumRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymposiumRegistry")
            .field("active", &self.active_symposiums())
            .finish_non_exhaustive()
    }
}
