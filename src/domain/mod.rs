//! Domain types for the upload queue.
//!
//! - Upload: queued delivery obligations and their status
//! - Failure: the typed error contract returned by uploaders

pub mod failure;
pub mod upload;

// Re-export commonly used types
pub use failure::{FailureKind, UploadFailure};
pub use upload::{Artifact, QueuedUpload, UploadId, UploadStatus, MAX_RETRIES};
