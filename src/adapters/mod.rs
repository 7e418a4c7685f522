//! Adapter interfaces for external collaborators.
//!
//! The queue talks to the outside world through two seams:
//! - `Uploader`: delivers an artifact to the remote store
//! - `CacheInvalidator`: told whenever a delivery lands

pub mod http;
pub mod invalidation;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{UploadFailure, UploadId};

pub use http::HttpUploader;
pub use invalidation::{BroadcastInvalidator, LogInvalidator, NoopInvalidator};

/// Record created by the remote store for a delivered artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Server-side identifier
    pub id: String,

    /// Where the recording can be fetched, if the server says
    #[serde(default)]
    pub url: Option<String>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }
}

/// Trait for delivering artifacts to the remote store
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Human-readable uploader name
    fn name(&self) -> &str;

    /// Deliver one artifact
    async fn upload(
        &self,
        locator: &Path,
        duration_seconds: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<RemoteRecord, UploadFailure>;

    /// Check that the remote store is reachable
    async fn health_check(&self) -> Result<(), UploadFailure> {
        Ok(())
    }
}

/// Notified after each successful delivery (fire-and-forget)
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, delivered: &UploadId);
}
