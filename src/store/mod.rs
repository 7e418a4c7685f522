//! Durable storage for the upload queue.
//!
//! Persistence is split in two:
//! - what to persist: the ordered queue, encoded as a JSON array
//! - where to persist it: a [`QueueStore`] backend holding one named slot
//!
//! Backends only move opaque text in and out of the slot, so queue logic never
//! depends on whether the slot lives in a file, an embedded database, or memory.

pub mod json;
pub mod lock;
pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ResolvedConfig, StoreBackend};
use crate::domain::QueuedUpload;

pub use json::JsonFileStore;
pub use lock::OwnerLock;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Default name of the slot holding the queue
pub const DEFAULT_SLOT: &str = "upload_queue";

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A durable slot holding the serialized queue
pub trait QueueStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Read the slot; `None` when nothing was ever saved
    fn read_slot(&self) -> Result<Option<String>, StoreError>;

    /// Replace the slot contents
    fn write_slot(&self, contents: &str) -> Result<(), StoreError>;
}

/// Serialize the queue for storage
pub fn encode(items: &[QueuedUpload]) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(items)?)
}

/// Parse a stored queue, dropping any repeated ids (first occurrence wins)
pub fn decode(contents: &str) -> Result<Vec<QueuedUpload>, StoreError> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<QueuedUpload> = serde_json::from_str(contents)?;

    let mut seen = HashSet::new();
    let before = items.len();
    let items: Vec<QueuedUpload> = items.into_iter().filter(|item| seen.insert(item.id)).collect();
    if items.len() != before {
        warn!(dropped = before - items.len(), "Dropped queue items with duplicate ids");
    }

    Ok(items)
}

/// Save the queue to a store
pub fn save_queue(store: &dyn QueueStore, items: &[QueuedUpload]) -> Result<(), StoreError> {
    let contents = encode(items)?;
    store.write_slot(&contents)?;
    debug!(backend = store.name(), items = items.len(), "Queue saved");
    Ok(())
}

/// Load the queue from a store.
///
/// Unreadable or corrupt data yields an empty queue: losing the queue is
/// preferable to refusing to start.
pub fn load_queue(store: &dyn QueueStore) -> Vec<QueuedUpload> {
    let contents = match store.read_slot() {
        Ok(Some(contents)) => contents,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(backend = store.name(), error = %e, "Failed to read queue, starting empty");
            return Vec::new();
        }
    };

    match decode(&contents) {
        Ok(items) => {
            debug!(backend = store.name(), items = items.len(), "Queue loaded");
            items
        }
        Err(e) => {
            warn!(backend = store.name(), error = %e, "Stored queue is corrupt, starting empty");
            Vec::new()
        }
    }
}

/// Open the backend selected by the configuration
pub fn open_store(config: &ResolvedConfig) -> Result<Arc<dyn QueueStore>> {
    let path = config.queue_path();
    let slot = config.store.slot.clone();

    let store: Arc<dyn QueueStore> = match config.store.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(path)),
        StoreBackend::Sqlite => {
            std::fs::create_dir_all(&config.home)?;
            Arc::new(SqliteStore::open(&path, slot)?)
        }
    };

    Ok(store)
}
