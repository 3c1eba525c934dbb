//! SQLite-backed conversation store.
//!
//! Conversations live in a `chat` table whose `chat` column holds the message
//! tree as JSON (`{"history": {"messages": {id: message}}}`). Symposium
//! settings sit in the `mode` and `config` columns, which older databases
//! gain through an idempotent migration on open.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{info, warn};
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use super::{ConversationStore, UserStore};
use crate::domain::{ChatMessage, Conversation, MessagePatch, User};
use crate::error::{Result, SymposiumError};
use crate::id::now_secs;

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        Self::init_schema(&db)?;
        Self::migrate(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user'
            );

            CREATE TABLE IF NOT EXISTS chat (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                archived INTEGER NOT NULL DEFAULT 0,
                chat TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_user ON chat(user_id);
            "#,
        )?;
        Ok(())
    }

    /// Add the `mode` and `config` columns when missing. Safe to run repeatedly.
    fn migrate(db: &Connection) -> Result<()> {
        let columns = Self::columns(db, "chat")?;

        if !columns.contains("mode") {
            db.execute("ALTER TABLE chat ADD COLUMN mode TEXT DEFAULT 'standard'", [])?;
            info!("Added chat.mode column");
        }
        if !columns.contains("config") {
            db.execute("ALTER TABLE chat ADD COLUMN config TEXT DEFAULT '{}'", [])?;
            info!("Added chat.config column");
        }

        Ok(())
    }

    fn columns(db: &Connection, table: &str) -> Result<HashSet<String>> {
        let mut stmt = db.prepare(&format!("PRAGMA table_info({})", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

        let mut columns = HashSet::new();
        for row in rows {
            columns.insert(row?);
        }
        Ok(columns)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| SymposiumError::Storage(e.to_string()))
    }

    /// Insert or replace a whole conversation, messages included.
    pub fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let messages: serde_json::Map<String, Value> = conversation
            .messages
            .iter()
            .map(|(id, m)| Ok((id.clone(), serde_json::to_value(m)?)))
            .collect::<Result<_>>()?;
        let chat = json!({ "history": { "messages": messages } });
        let now = now_secs();

        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO chat
            (id, user_id, title, archived, chat, created_at, updated_at, mode, config)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8)
            "#,
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                conversation.archived,
                chat.to_string(),
                now,
                conversation.mode,
                conversation.config.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO user (id, name, role) VALUES (?1, ?2, ?3)",
            params![user.id, user.name, user.role],
        )?;
        Ok(())
    }

    pub fn set_config(&self, conversation_id: &str, config: &Value) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE chat SET config = ?1, updated_at = ?2 WHERE id = ?3",
            params![config.to_string(), now_secs(), conversation_id],
        )?;
        if changed == 0 {
            return Err(SymposiumError::NotFound(format!("conversation {}", conversation_id)));
        }
        Ok(())
    }

    pub fn set_mode(&self, conversation_id: &str, mode: &str) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE chat SET mode = ?1, updated_at = ?2 WHERE id = ?3",
            params![mode, now_secs(), conversation_id],
        )?;
        if changed == 0 {
            return Err(SymposiumError::NotFound(format!("conversation {}", conversation_id)));
        }
        Ok(())
    }

    pub fn set_archived(&self, conversation_id: &str, archived: bool) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE chat SET archived = ?1, updated_at = ?2 WHERE id = ?3",
            params![archived, now_secs(), conversation_id],
        )?;
        if changed == 0 {
            return Err(SymposiumError::NotFound(format!("conversation {}", conversation_id)));
        }
        Ok(())
    }

    /// Ids of conversations in symposium mode that are not archived
    pub fn list_symposiums(&self) -> Result<Vec<String>> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT id FROM chat WHERE mode = 'symposium' AND archived = 0 ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn read_chat(db: &Connection, conversation_id: &str) -> Result<Option<Value>> {
        let result = db.query_row("SELECT chat FROM chat WHERE id = ?1", [conversation_id], |row| {
            row.get::<_, String>(0)
        });

        match result {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw).unwrap_or_else(|_| json!({})))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode the message map, skipping entries that do not parse.
fn decode_messages(conversation_id: &str, chat: &Value) -> HashMap<String, ChatMessage> {
    let Some(map) = chat.pointer("/history/messages").and_then(Value::as_object) else {
        return HashMap::new();
    };

    map.iter()
        .filter_map(|(id, raw)| match serde_json::from_value::<ChatMessage>(raw.clone()) {
            Ok(mut message) => {
                if message.id.is_empty() {
                    message.id = id.clone();
                }
                Some((id.clone(), message))
            }
            Err(e) => {
                warn!("Skipping malformed message {} in chat {}: {}", id, conversation_id, e);
                None
            }
        })
        .collect()
}

impl ConversationStore for SqliteStore {
    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let db = self.conn()?;
        let result = db.query_row(
            "SELECT user_id, title, archived, chat, mode, config FROM chat WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        );

        let (user_id, title, archived, chat, mode, config) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let chat: Value = serde_json::from_str(&chat).unwrap_or_else(|_| json!({}));
        let config = config
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| json!({}));

        Ok(Some(Conversation {
            id: id.to_string(),
            user_id,
            title,
            archived,
            mode: mode.unwrap_or_else(|| "standard".to_string()),
            config,
            messages: decode_messages(id, &chat),
        }))
    }

    fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<Option<ChatMessage>> {
        let db = self.conn()?;
        let Some(chat) = Self::read_chat(&db, conversation_id)? else {
            return Ok(None);
        };
        Ok(decode_messages(conversation_id, &chat).remove(message_id))
    }

    fn upsert_message(&self, conversation_id: &str, message_id: &str, patch: MessagePatch) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let mut chat = Self::read_chat(&tx, conversation_id)?
            .ok_or_else(|| SymposiumError::NotFound(format!("conversation {}", conversation_id)))?;

        let mut message = chat
            .pointer("/history/messages")
            .and_then(|messages| messages.get(message_id))
            .and_then(|raw| serde_json::from_value::<ChatMessage>(raw.clone()).ok())
            .unwrap_or_else(|| ChatMessage::empty(message_id));
        patch.apply(&mut message);

        if !chat.is_object() {
            chat = json!({});
        }
        let history = chat
            .as_object_mut()
            .map(|c| c.entry("history").or_insert_with(|| json!({})));
        let Some(history) = history.and_then(Value::as_object_mut) else {
            return Err(SymposiumError::Storage(format!("chat {} has a malformed history", conversation_id)));
        };
        let messages = history.entry("messages").or_insert_with(|| json!({}));
        let Some(messages) = messages.as_object_mut() else {
            return Err(SymposiumError::Storage(format!("chat {} has malformed messages", conversation_id)));
        };
        messages.insert(message_id.to_string(), serde_json::to_value(&message)?);

        tx.execute(
            "UPDATE chat SET chat = ?1, updated_at = ?2 WHERE id = ?3",
            params![chat.to_string(), now_secs(), conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let db = self.conn()?;
        let result = db.query_row("SELECT id, name, role FROM user WHERE id = ?1", [id], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
            })
        });

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
