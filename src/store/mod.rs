//! Persistence seams for conversations and users.
//!
//! The scheduler only needs three conversation operations and one user lookup.
//! Both traits are synchronous; async callers go through [`blocking`] so a slow
//! store never stalls the runtime.

mod memory;
mod sqlite;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::domain::{ChatMessage, Conversation, MessagePatch, User};
use crate::error::{Result, SymposiumError};

/// Conversation storage used by the scheduler.
pub trait ConversationStore: Send + Sync {
    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<Option<ChatMessage>>;

    /// Merge `patch` into the message, creating it if absent.
    fn upsert_message(&self, conversation_id: &str, message_id: &str, patch: MessagePatch) -> Result<()>;
}

/// User lookup; the user is handed to the generator for each turn.
pub trait UserStore: Send + Sync {
    fn get_user(&self, id: &str) -> Result<Option<User>>;
}

/// Run a synchronous store call on the blocking pool.
pub async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| SymposiumError::Storage(format!("store task failed: {}", e)))?
}
