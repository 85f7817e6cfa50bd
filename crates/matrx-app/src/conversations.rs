use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::chat::ChatMessage;

pub const CONVERSATIONS_KEY: &str = "matrx-chat-conversations";
pub const MAX_CONVERSATIONS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `<data dir>/matrx/matrx-chat-conversations.json`
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("matrx")
        .join(format!("{}.json", CONVERSATIONS_KEY))
}

/// Chat history kept as one JSON document, newest first, capped at
/// [`MAX_CONVERSATIONS`]. Disk failures never reach the caller: a missing or
/// unreadable file starts empty and failed writes are logged.
pub struct ConversationStore {
    path: PathBuf,
    records: Mutex<Vec<ConversationRecord>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ConversationStore {
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<ConversationRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable conversation file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read conversations from {:?}: {}", path, e);
                Vec::new()
            }
        };
        let store = Self {
            path,
            records: Mutex::new(records),
            write_lock: tokio::sync::Mutex::new(()),
        };
        store.records.lock().sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        store
    }

    pub async fn open_default() -> Self {
        Self::open(default_store_path()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Vec<ConversationRecord> {
        self.records.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<ConversationRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Inserts or replaces `record`, evicting the least recently updated
    /// conversations beyond the cap.
    pub async fn save(&self, record: ConversationRecord) {
        {
            let mut records = self.records.lock();
            records.retain(|r| r.id != record.id);
            records.push(record);
            records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            records.truncate(MAX_CONVERSATIONS);
        }
        self.persist().await;
    }

    pub async fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut records = self.records.lock();
            let before = records.len();
            records.retain(|r| r.id != id);
            records.len() != before
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn clear(&self) {
        self.records.lock().clear();
        self.persist().await;
    }

    /// Snapshots and writes under one lock, so the file always ends with the
    /// latest in-memory state.
    async fn persist(&self) {
        let _write = self.write_lock.lock().await;
        let payload = {
            let records = self.records.lock();
            serde_json::to_string_pretty(&*records)
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode conversations: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                tracing::warn!("Failed to create {:?}: {}", parent, e);
                return;
            }
        }
        if let Err(e) = fs::write(&self.path, payload).await {
            tracing::warn!("Failed to write conversations to {:?}: {}", self.path, e);
        }
    }
}
