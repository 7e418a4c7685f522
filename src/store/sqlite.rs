//! Embedded SQLite backend.
//!
//! Keeps slots in a small key-value table so the queue can share a database
//! file with other application state. A file that is not a readable database
//! is moved aside to `<file>.corrupt` and replaced with an empty one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::warn;

use super::{QueueStore, StoreError};
use crate::config::paths::CORRUPT_SUFFIX;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    slot  TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

/// Queue slot stored in a SQLite key-value table
pub struct SqliteStore {
    conn: Mutex<Connection>,
    slot: String,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path, slot: impl Into<String>) -> Result<Self, StoreError> {
        let slot = slot.into();

        match Connection::open(path).and_then(create_schema) {
            Ok(conn) => Ok(Self::with_connection(conn, slot)),
            Err(e) if is_corrupt(&e) => {
                let aside = corrupt_path(path);
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Queue database unreadable, starting empty"
                );
                fs::rename(path, &aside)?;

                let conn = create_schema(Connection::open(path)?)?;
                Ok(Self::with_connection(conn, slot))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a private in-memory database
    pub fn open_in_memory(slot: impl Into<String>) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, slot.into())
    }

    fn init(conn: Connection, slot: String) -> Result<Self, StoreError> {
        Ok(Self::with_connection(create_schema(conn)?, slot))
    }

    fn with_connection(conn: Connection, slot: String) -> Self {
        Self {
            conn: Mutex::new(conn),
            slot,
        }
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn create_schema(conn: Connection) -> rusqlite::Result<Connection> {
    conn.execute(SCHEMA, [])?;
    Ok(conn)
}

/// Whether an open failure means the file holds no usable database
fn is_corrupt(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(CORRUPT_SUFFIX);
    path.with_file_name(name)
}

impl QueueStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn read_slot(&self) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv WHERE slot = ?1",
                params![self.slot],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_slot(&self, contents: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO kv (slot, value) VALUES (?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET value = excluded.value",
            params![self.slot, contents],
        )?;
        Ok(())
    }
}
