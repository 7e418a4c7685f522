//! Cache invalidation sinks.

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::CacheInvalidator;
use crate::domain::UploadId;

/// Ignores every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _delivered: &UploadId) {}
}

/// Logs each delivery; used by the CLI where no cache exists
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInvalidator;

impl CacheInvalidator for LogInvalidator {
    fn invalidate(&self, delivered: &UploadId) {
        info!(id = %delivered, "Remote recordings changed");
    }
}

/// Publishes delivered ids to any number of subscribers
pub struct BroadcastInvalidator {
    tx: broadcast::Sender<UploadId>,
}

impl BroadcastInvalidator {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive future delivery signals
    pub fn subscribe(&self) -> broadcast::Receiver<UploadId> {
        self.tx.subscribe()
    }
}

impl CacheInvalidator for BroadcastInvalidator {
    fn invalidate(&self, delivered: &UploadId) {
        // No subscribers is fine: nobody has a cache to refresh
        if self.tx.send(*delivered).is_err() {
            debug!(id = %delivered, "No invalidation subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let invalidator = BroadcastInvalidator::new(8);
        let mut rx1 = invalidator.subscribe();
        let mut rx2 = invalidator.subscribe();

        let id = UploadId::new();
        invalidator.invalidate(&id);

        assert_eq!(rx1.recv().await.unwrap(), id);
        assert_eq!(rx2.recv().await.unwrap(), id);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let invalidator = BroadcastInvalidator::new(8);
        invalidator.invalidate(&UploadId::new());
    }
}
