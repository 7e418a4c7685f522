//! In-memory queue state, mirrored to a durable store.
//!
//! Every mutation happens under one lock and is saved before the lock is
//! released, so racing callers never interleave partial writes and the durable
//! copy always reflects some complete sequence of operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::recovery::recover;
use crate::domain::{Artifact, QueuedUpload, UploadId, UploadStatus};
use crate::store::{self, QueueStore, StoreError};

/// Number of items listed in a summary
const SUMMARY_RECENT: usize = 5;

/// Errors from queue state operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue item not found: {0}")]
    NotFound(UploadId),

    #[error("Failed to persist queue: {0}")]
    Store(#[from] StoreError),
}

/// Counts by status, for status displays
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub uploading: usize,
    pub failed: usize,
    /// Items whose retry budget is spent (counted within their status too)
    pub exhausted: usize,
    /// Oldest items, in FIFO order
    pub recent: Vec<QueuedUpload>,
}

impl QueueSummary {
    /// Total items in queue
    pub fn total(&self) -> usize {
        self.pending + self.uploading + self.failed
    }
}

/// The upload queue: ordered items plus the processing flag
pub struct QueueState {
    items: Mutex<Vec<QueuedUpload>>,
    store: Arc<dyn QueueStore>,
    processing: AtomicBool,
}

impl QueueState {
    /// Load the queue from a store and repair interrupted items.
    ///
    /// Recovery runs before the state is handed out, so no caller can observe
    /// an item stuck at `uploading` from a previous process.
    pub fn rehydrate(store: Arc<dyn QueueStore>) -> Self {
        let mut items = store::load_queue(store.as_ref());

        let repaired = recover(&mut items);
        if repaired > 0 {
            if let Err(e) = store::save_queue(store.as_ref(), &items) {
                warn!(error = %e, "Failed to persist recovered queue");
            }
        }

        info!(backend = store.name(), items = items.len(), repaired, "Upload queue ready");

        Self {
            items: Mutex::new(items),
            store,
            processing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedUpload>> {
        // A panic elsewhere must not wedge the queue
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, items: &[QueuedUpload]) -> Result<(), QueueError> {
        store::save_queue(self.store.as_ref(), items)?;
        Ok(())
    }

    /// Append a new pending item and return its id
    pub fn enqueue(&self, artifact: Artifact) -> Result<UploadId, QueueError> {
        self.enqueue_item(QueuedUpload::new(artifact))
    }

    /// Append an item built by the caller, keeping its id
    pub(crate) fn enqueue_item(&self, item: QueuedUpload) -> Result<UploadId, QueueError> {
        let id = item.id;

        let mut items = self.lock();
        info!(%id, file = %item.file_name(), "Enqueued upload");
        items.push(item);
        self.persist(&items)?;

        Ok(id)
    }

    /// Remove an item. Unknown ids are ignored; returns whether one was removed.
    pub fn remove(&self, id: &UploadId) -> Result<bool, QueueError> {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|item| item.id != *id);

        if items.len() == before {
            debug!(%id, "Remove of unknown queue item ignored");
            return Ok(false);
        }

        self.persist(&items)?;
        Ok(true)
    }

    /// Transition an item's status.
    ///
    /// Moving to `failed` charges one retry; other statuses leave the count
    /// alone. A supplied error replaces `last_error`.
    pub fn update_status(
        &self,
        id: &UploadId,
        status: UploadStatus,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        let mut items = self.lock();
        let item = items
            .iter_mut()
            .find(|item| item.id == *id)
            .ok_or(QueueError::NotFound(*id))?;

        let from = item.status;
        item.status = status;
        if status == UploadStatus::Failed {
            item.retry_count += 1;
        }
        if error.is_some() {
            item.last_error = error;
        }

        debug!(%id, %from, to = %status, retry_count = item.retry_count, "Status updated");

        self.persist(&items)
    }

    /// Purge every item whose retry budget is spent. Returns how many went.
    pub fn clear_exhausted(&self) -> Result<usize, QueueError> {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|item| !item.is_exhausted());
        let removed = before - items.len();

        if removed > 0 {
            info!(removed, "Cleared exhausted uploads");
            self.persist(&items)?;
        }

        Ok(removed)
    }

    /// All items in FIFO order
    pub fn snapshot(&self) -> Vec<QueuedUpload> {
        self.lock().clone()
    }

    /// Items a processing pass may pick up, in FIFO order
    pub fn eligible(&self) -> Vec<QueuedUpload> {
        self.lock().iter().filter(|item| item.is_eligible()).cloned().collect()
    }

    /// Look up a single item
    pub fn get(&self, id: &UploadId) -> Option<QueuedUpload> {
        self.lock().iter().find(|item| item.id == *id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Status counts plus the oldest few items
    pub fn summary(&self) -> QueueSummary {
        summarize(&self.lock())
    }

    /// Whether a processing pass is running
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Claim the processing flag.
    ///
    /// Returns `None` when a pass is already active. The flag is released when
    /// the guard drops, including during a panic unwind.
    pub fn try_begin_pass(&self) -> Option<PassGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard { flag: &self.processing })
    }
}

/// Build a summary from a list of items
pub fn summarize(items: &[QueuedUpload]) -> QueueSummary {
    let mut summary = QueueSummary::default();

    for item in items {
        match item.status {
            UploadStatus::Pending => summary.pending += 1,
            UploadStatus::Uploading => summary.uploading += 1,
            UploadStatus::Failed => summary.failed += 1,
        }
        if item.is_exhausted() {
            summary.exhausted += 1;
        }
    }

    summary.recent = items.iter().take(SUMMARY_RECENT).cloned().collect();
    summary
}

/// Holds the processing flag for the duration of a pass
pub struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MAX_RETRIES;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn artifact(name: &str) -> Artifact {
        Artifact::new(name, 10.0, Utc::now())
    }

    fn create_test_state() -> (QueueState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (QueueState::rehydrate(store.clone()), store)
    }

    #[test]
    fn test_enqueue_appends_pending_and_persists() {
        let (state, store) = create_test_state();

        let a = state.enqueue(artifact("a.m4a")).unwrap();
        let b = state.enqueue(artifact("b.m4a")).unwrap();
        assert_ne!(a, b);

        let items = state.snapshot();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, a);
        assert_eq!(items[1].id, b);
        assert!(items.iter().all(|i| i.status == UploadStatus::Pending && i.retry_count == 0));

        assert_eq!(store.writes(), 2);
        assert_eq!(store::load_queue(store.as_ref()), items);
    }

    #[test]
    fn test_only_failed_transition_counts_retry() {
        let (state, _store) = create_test_state();
        let id = state.enqueue(artifact("a.m4a")).unwrap();

        state.update_status(&id, UploadStatus::Uploading, None).unwrap();
        state
            .update_status(&id, UploadStatus::Pending, Some("network unavailable".into()))
            .unwrap();
        assert_eq!(state.get(&id).unwrap().retry_count, 0);

        state.update_status(&id, UploadStatus::Failed, Some("500".into())).unwrap();
        let item = state.get(&id).unwrap();
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.last_error.as_deref(), Some("500"));

        // A transition without an error keeps the last diagnostic
        state.update_status(&id, UploadStatus::Uploading, None).unwrap();
        assert_eq!(state.get(&id).unwrap().last_error.as_deref(), Some("500"));
    }

    #[test]
    fn test_update_unknown_id() {
        let (state, _store) = create_test_state();
        let result = state.update_status(&UploadId::new(), UploadStatus::Failed, None);
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    #[test]
    fn test_remove() {
        let (state, store) = create_test_state();
        let id = state.enqueue(artifact("a.m4a")).unwrap();

        assert!(state.remove(&id).unwrap());
        assert!(state.is_empty());
        assert!(!state.remove(&id).unwrap());
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_clear_exhausted_is_selective() {
        let (state, _store) = create_test_state();
        let keep = state.enqueue(artifact("keep.m4a")).unwrap();
        let gone = state.enqueue(artifact("gone.m4a")).unwrap();

        for _ in 0..MAX_RETRIES {
            state.update_status(&gone, UploadStatus::Failed, Some("bad".into())).unwrap();
        }
        state.update_status(&keep, UploadStatus::Failed, Some("bad".into())).unwrap();

        // Exhausted items stay visible until purged
        assert_eq!(state.len(), 2);
        assert_eq!(state.summary().exhausted, 1);
        assert!(state.eligible().iter().all(|i| i.id == keep));

        assert_eq!(state.clear_exhausted().unwrap(), 1);
        assert_eq!(state.len(), 1);
        assert!(state.get(&keep).is_some());
        assert_eq!(state.clear_exhausted().unwrap(), 0);
    }

    #[test]
    fn test_save_failure_keeps_memory_change() {
        let (state, store) = create_test_state();
        store.set_unavailable(true);

        let result = state.enqueue(artifact("a.m4a"));
        assert!(matches!(result, Err(QueueError::Store(_))));
        assert_eq!(state.len(), 1);

        // The next successful save catches the durable copy up
        store.set_unavailable(false);
        state.enqueue(artifact("b.m4a")).unwrap();
        assert_eq!(store::load_queue(store.as_ref()).len(), 2);
    }

    #[test]
    fn test_pass_guard_releases_flag() {
        let (state, _store) = create_test_state();

        let guard = state.try_begin_pass().unwrap();
        assert!(state.is_processing());
        assert!(state.try_begin_pass().is_none());

        drop(guard);
        assert!(!state.is_processing());
        assert!(state.try_begin_pass().is_some());
    }

    #[test]
    fn test_pass_guard_released_on_panic() {
        let (state, _store) = create_test_state();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.try_begin_pass().unwrap();
            panic!("uploader blew up");
        }));

        assert!(result.is_err());
        assert!(!state.is_processing());
    }

    #[test]
    fn test_rehydrate_repairs_and_persists() {
        let mut stuck = QueuedUpload::new(artifact("a.m4a"));
        stuck.status = UploadStatus::Uploading;
        stuck.retry_count = 1;
        let store = Arc::new(MemoryStore::with_contents(store::encode(&[stuck.clone()]).unwrap()));

        let state = QueueState::rehydrate(store.clone());

        let item = state.get(&stuck.id).unwrap();
        assert_eq!(item.status, UploadStatus::Pending);
        assert_eq!(item.retry_count, 1);
        assert_eq!(store.writes(), 1);
        assert_eq!(store::load_queue(store.as_ref())[0].status, UploadStatus::Pending);
    }

    #[test]
    fn test_summary_counts() {
        let (state, _store) = create_test_state();
        for i in 0..7 {
            state.enqueue(artifact(&format!("{}.m4a", i))).unwrap();
        }
        let first = state.snapshot()[0].id;
        state.update_status(&first, UploadStatus::Uploading, None).unwrap();

        let summary = state.summary();
        assert_eq!(summary.pending, 6);
        assert_eq!(summary.uploading, 1);
        assert_eq!(summary.total(), 7);
        assert_eq!(summary.recent.len(), 5);
        assert_eq!(summary.recent[0].id, first);
    }
}
