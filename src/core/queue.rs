//! Upload queue facade.
//!
//! Built once at the application's composition root and shared explicitly
//! with whatever needs to enqueue uploads or trigger processing.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use super::classifier::{classify, FailureClass};
use super::processor::{PassReport, QueueProcessor};
use super::state::{QueueError, QueueState, QueueSummary};
use crate::adapters::{CacheInvalidator, RemoteRecord, Uploader};
use crate::domain::{Artifact, QueuedUpload, UploadFailure, UploadId};
use crate::store::QueueStore;

/// Errors from an immediate delivery attempt
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Rejected or unauthorized; not queued
    #[error("Upload failed: {0}")]
    Upload(UploadFailure),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result of `submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered right away
    Delivered(RemoteRecord),

    /// Network was down; queued for a later pass
    Queued(UploadId),
}

/// The offline-tolerant upload queue
pub struct UploadQueue {
    state: Arc<QueueState>,
    processor: QueueProcessor,
}

impl UploadQueue {
    /// Rehydrate the queue from `store`, repair interrupted items, and wire
    /// the collaborators
    pub fn open(
        store: Arc<dyn QueueStore>,
        uploader: Arc<dyn Uploader>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        let state = Arc::new(QueueState::rehydrate(store));
        let processor = QueueProcessor::new(state.clone(), uploader, invalidator);
        Self { state, processor }
    }

    /// Refuse passes that start sooner than `interval` after the previous one
    pub fn with_min_pass_interval(mut self, interval: Duration) -> Self {
        self.processor = self.processor.with_min_pass_interval(interval);
        self
    }

    /// Shared queue state
    pub fn state(&self) -> &Arc<QueueState> {
        &self.state
    }

    /// Queue an artifact for a later pass
    pub fn enqueue(&self, artifact: Artifact) -> Result<UploadId, QueueError> {
        self.state.enqueue(artifact)
    }

    /// Try to deliver now; fall back to the queue only when the network is down
    pub async fn submit(&self, artifact: Artifact) -> Result<SubmitOutcome, SubmitError> {
        // The id is assigned up front so a delivery and a later queue entry agree
        let item = QueuedUpload::new(artifact);

        let result = self
            .processor
            .uploader()
            .upload(&item.locator, item.duration_seconds, item.recorded_at)
            .await;

        match result {
            Ok(record) => {
                info!(id = %item.id, remote_id = %record.id, "Delivered immediately");
                self.processor.invalidator().invalidate(&item.id);
                Ok(SubmitOutcome::Delivered(record))
            }
            Err(failure) if classify(&failure) == FailureClass::NetworkFailure => {
                info!(id = %item.id, file = %item.file_name(), error = %failure, "Offline, queueing upload");
                Ok(SubmitOutcome::Queued(self.state.enqueue_item(item)?))
            }
            Err(failure) => Err(SubmitError::Upload(failure)),
        }
    }

    /// Run one delivery pass
    pub async fn process_queue(&self) -> PassReport {
        self.processor.process_queue().await
    }

    /// Time until a throttled pass would be admitted
    pub fn throttle_remaining(&self) -> Duration {
        self.processor.throttle_remaining()
    }

    /// Purge exhausted items
    pub fn clear_exhausted(&self) -> Result<usize, QueueError> {
        self.state.clear_exhausted()
    }

    /// All items in FIFO order
    pub fn snapshot(&self) -> Vec<QueuedUpload> {
        self.state.snapshot()
    }

    /// Status counts
    pub fn summary(&self) -> QueueSummary {
        self.state.summary()
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }
}
