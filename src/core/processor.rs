//! Queue processor: single-flight FIFO delivery passes.
//!
//! A pass snapshots the eligible items and uploads them one at a time.
//! Environment-wide failures (network, auth) end the pass early and cost no
//! retry budget; server failures are charged to the item and the pass carries
//! on with the next one.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::classifier::{classify, FailureClass, AUTHENTICATION_REQUIRED, NETWORK_UNAVAILABLE};
use super::state::{QueueError, QueueState};
use crate::adapters::{CacheInvalidator, Uploader};
use crate::domain::{QueuedUpload, UploadId, UploadStatus};

/// Diagnostic stored on an item whose upload never reported back
pub const UPLOAD_ABANDONED: &str = "upload abandoned";

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass holds the processing flag
    AlreadyRunning,

    /// The previous pass started less than the minimum interval ago
    Throttled,

    /// No pending or failed item with retry budget left
    NothingEligible,
}

/// Counters for a pass that ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Items handed to the uploader
    pub attempted: usize,

    /// Items delivered and removed
    pub delivered: usize,

    /// Items charged a retry
    pub failed: usize,

    /// Failure class that ended the pass early, if any
    pub halted_by: Option<FailureClass>,
}

/// Outcome of a `process_queue` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReport {
    Skipped(SkipReason),
    Ran(PassStats),
}

impl PassReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Stats of a pass that ran
    pub fn stats(&self) -> Option<&PassStats> {
        match self {
            Self::Ran(stats) => Some(stats),
            Self::Skipped(_) => None,
        }
    }
}

/// Runs delivery passes over a queue
pub struct QueueProcessor {
    state: Arc<QueueState>,
    uploader: Arc<dyn Uploader>,
    invalidator: Arc<dyn CacheInvalidator>,
    min_pass_interval: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl QueueProcessor {
    pub fn new(
        state: Arc<QueueState>,
        uploader: Arc<dyn Uploader>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            state,
            uploader,
            invalidator,
            min_pass_interval: Duration::ZERO,
            last_pass: Mutex::new(None),
        }
    }

    /// Refuse passes that start sooner than `interval` after the previous one.
    /// Zero disables the throttle.
    pub fn with_min_pass_interval(mut self, interval: Duration) -> Self {
        self.min_pass_interval = interval;
        self
    }

    pub fn uploader(&self) -> &Arc<dyn Uploader> {
        &self.uploader
    }

    pub fn invalidator(&self) -> &Arc<dyn CacheInvalidator> {
        &self.invalidator
    }

    /// Time until the throttle admits another pass
    pub fn throttle_remaining(&self) -> Duration {
        let last = self.last_pass.lock().unwrap_or_else(|p| p.into_inner());
        match *last {
            Some(previous) => self.min_pass_interval.saturating_sub(previous.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Claim the next pass slot under the throttle, recording its start
    fn admit(&self) -> bool {
        let mut last = self.last_pass.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();

        if let Some(previous) = *last {
            if !self.min_pass_interval.is_zero()
                && now.duration_since(previous) < self.min_pass_interval
            {
                return false;
            }
        }

        *last = Some(now);
        true
    }

    /// Run one delivery pass
    #[instrument(skip(self), fields(uploader = %self.uploader.name()))]
    pub async fn process_queue(&self) -> PassReport {
        let Some(_guard) = self.state.try_begin_pass() else {
            debug!("Pass already running, skipping");
            return PassReport::Skipped(SkipReason::AlreadyRunning);
        };

        let eligible = self.state.eligible();
        if eligible.is_empty() {
            debug!("Nothing eligible to upload");
            return PassReport::Skipped(SkipReason::NothingEligible);
        }

        if !self.admit() {
            debug!(interval = ?self.min_pass_interval, "Pass throttled");
            return PassReport::Skipped(SkipReason::Throttled);
        }

        info!(items = eligible.len(), "Starting upload pass");

        let mut stats = PassStats::default();
        for item in &eligible {
            if let Some(class) = self.deliver(item, &mut stats).await {
                stats.halted_by = Some(class);
                break;
            }
        }

        info!(
            attempted = stats.attempted,
            delivered = stats.delivered,
            failed = stats.failed,
            halted_by = ?stats.halted_by,
            "Upload pass finished"
        );

        PassReport::Ran(stats)
    }

    /// Upload one item; returns the failure class if the pass must stop
    async fn deliver(&self, item: &QueuedUpload, stats: &mut PassStats) -> Option<FailureClass> {
        match self.state.update_status(&item.id, UploadStatus::Uploading, None) {
            Err(QueueError::NotFound(_)) => {
                debug!(id = %item.id, "Item left the queue before upload");
                return None;
            }
            other => log_store_error(other, item),
        }

        let in_flight = InFlight::new(&self.state, item.id);
        stats.attempted += 1;
        debug!(id = %item.id, file = %item.file_name(), "Uploading");

        let result = self
            .uploader
            .upload(&item.locator, item.duration_seconds, item.recorded_at)
            .await;
        in_flight.settle();

        match result {
            Ok(record) => {
                info!(id = %item.id, remote_id = %record.id, "Upload delivered");
                log_store_error(self.state.remove(&item.id).map(|_| ()), item);
                self.invalidator.invalidate(&item.id);
                stats.delivered += 1;
                None
            }
            Err(failure) => {
                let class = classify(&failure);
                let (status, message) = match class {
                    FailureClass::NetworkFailure => (UploadStatus::Pending, NETWORK_UNAVAILABLE.to_string()),
                    FailureClass::AuthFailure => (UploadStatus::Pending, AUTHENTICATION_REQUIRED.to_string()),
                    FailureClass::ServerFailure => (UploadStatus::Failed, failure.message.clone()),
                };

                warn!(id = %item.id, ?class, error = %failure, "Upload failed");
                log_store_error(self.state.update_status(&item.id, status, Some(message)), item);

                if class.consumes_retry() {
                    stats.failed += 1;
                }
                class.halts_pass().then_some(class)
            }
        }
    }
}

/// Returns an `uploading` item to `pending` if its upload never settles.
///
/// Covers an uploader that panics and a pass future dropped mid-upload, so
/// the item stays eligible for later passes in the same process.
struct InFlight<'a> {
    state: &'a QueueState,
    id: UploadId,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a QueueState, id: UploadId) -> Self {
        Self {
            state,
            id,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        warn!(id = %self.id, "Upload abandoned, returning item to pending");
        match self
            .state
            .update_status(&self.id, UploadStatus::Pending, Some(UPLOAD_ABANDONED.to_string()))
        {
            Ok(()) | Err(QueueError::NotFound(_)) => {}
            Err(e) => warn!(id = %self.id, error = %e, "Queue update not persisted"),
        }
    }
}

/// The in-memory change stands even when saving fails; the next save catches up
fn log_store_error(result: Result<(), QueueError>, item: &QueuedUpload) {
    if let Err(e) = result {
        warn!(id = %item.id, error = %e, "Queue update not persisted");
    }
}
