//! voicedrop - Offline-tolerant upload queue for voice notes
//!
//! Guarantees that a locally captured recording eventually reaches the
//! remote store, despite dropped connectivity, expired credentials, server
//! errors, and the process being killed mid-upload.
//!
//! # Architecture
//!
//! The queue is an ordered list of delivery obligations:
//! - Every mutation is saved through to a durable store before returning
//! - On startup, items interrupted mid-upload are returned to pending
//! - One processing pass at a time walks the queue in FIFO order
//! - Network and auth failures end the pass; server failures cost one retry
//!
//! # Modules
//!
//! - `adapters`: External collaborators (Uploader, CacheInvalidator, HTTP)
//! - `core`: Queue logic (QueueState, QueueProcessor, Recovery, Triggers)
//! - `domain`: Data structures (QueuedUpload, UploadFailure)
//! - `store`: Persistence backends (JSON file, SQLite, memory)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Queue a recording while offline
//! voicedrop enqueue memo.m4a --duration 12
//!
//! # Deliver whatever is queued
//! voicedrop process
//!
//! # Keep delivering as connectivity comes and goes
//! voicedrop run
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{CacheInvalidator, RemoteRecord, Uploader};
pub use self::core::{PassReport, QueueState, UploadQueue};
pub use domain::{Artifact, FailureKind, QueuedUpload, UploadFailure, UploadId, UploadStatus, MAX_RETRIES};
pub use store::{JsonFileStore, MemoryStore, OwnerLock, QueueStore, SqliteStore};
