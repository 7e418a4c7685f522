//! Startup repair of items interrupted mid-upload.

use tracing::info;

use crate::domain::{QueuedUpload, UploadStatus};

/// Diagnostic stored on items repaired at startup
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Return every `uploading` item to `pending`.
///
/// An interrupted upload is not a failed attempt, so `retry_count` is left
/// alone. Returns the number of repaired items.
pub fn recover(items: &mut [QueuedUpload]) -> usize {
    let mut repaired = 0;

    for item in items.iter_mut().filter(|i| i.status == UploadStatus::Uploading) {
        item.status = UploadStatus::Pending;
        item.last_error = Some(INTERRUPTED_BY_RESTART.to_string());
        repaired += 1;

        info!(id = %item.id, file = %item.file_name(), "Recovered interrupted upload");
    }

    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Artifact;
    use chrono::Utc;

    fn item(status: UploadStatus, retry_count: u32) -> QueuedUpload {
        let mut item = QueuedUpload::new(Artifact::new("memo.m4a", 3.0, Utc::now()));
        item.status = status;
        item.retry_count = retry_count;
        item
    }

    #[test]
    fn test_uploading_items_return_to_pending() {
        let mut items = vec![
            item(UploadStatus::Uploading, 2),
            item(UploadStatus::Pending, 0),
            item(UploadStatus::Failed, 1),
        ];

        assert_eq!(recover(&mut items), 1);

        assert_eq!(items[0].status, UploadStatus::Pending);
        assert_eq!(items[0].retry_count, 2);
        assert_eq!(items[0].last_error.as_deref(), Some(INTERRUPTED_BY_RESTART));

        // Others untouched
        assert_eq!(items[1].status, UploadStatus::Pending);
        assert!(items[1].last_error.is_none());
        assert_eq!(items[2].status, UploadStatus::Failed);
        assert_eq!(items[2].retry_count, 1);
    }

    #[test]
    fn test_nothing_to_repair() {
        let mut items = vec![item(UploadStatus::Pending, 0)];
        let before = items.clone();

        assert_eq!(recover(&mut items), 0);
        assert_eq!(items, before);
    }
}
