//! Failure classification.
//!
//! Network and auth failures are environment-wide: every other item would
//! fail the same way, so a pass stops and no retry budget is spent.
//! Server failures are item-specific: the item is charged a retry and the pass
//! moves on to the next item.

use crate::domain::{FailureKind, UploadFailure};

/// Diagnostic stored on an item after a network failure
pub const NETWORK_UNAVAILABLE: &str = "network unavailable";

/// Diagnostic stored on an item after an auth failure
pub const AUTHENTICATION_REQUIRED: &str = "authentication required";

/// Retry policy class of an upload failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    NetworkFailure,
    AuthFailure,
    ServerFailure,
}

impl FailureClass {
    /// Whether the rest of the pass should be abandoned
    pub fn halts_pass(self) -> bool {
        matches!(self, Self::NetworkFailure | Self::AuthFailure)
    }

    /// Whether the failure is charged against the item's retry budget
    pub fn consumes_retry(self) -> bool {
        matches!(self, Self::ServerFailure)
    }
}

/// Classify an uploader failure by its signaled kind
pub fn classify(failure: &UploadFailure) -> FailureClass {
    match failure.kind {
        FailureKind::Unreachable => FailureClass::NetworkFailure,
        FailureKind::Unauthorized => FailureClass::AuthFailure,
        FailureKind::Rejected => FailureClass::ServerFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_kind() {
        assert_eq!(
            classify(&UploadFailure::unreachable("dns lookup failed")),
            FailureClass::NetworkFailure
        );
        assert_eq!(
            classify(&UploadFailure::unauthorized("token expired")),
            FailureClass::AuthFailure
        );
        assert_eq!(
            classify(&UploadFailure::rejected("422 unprocessable")),
            FailureClass::ServerFailure
        );
    }

    #[test]
    fn test_message_text_is_ignored() {
        // A rejection whose message mentions the network is still a server failure
        let failure = UploadFailure::rejected("Network request failed: 500");
        assert_eq!(classify(&failure), FailureClass::ServerFailure);

        let failure = UploadFailure::unreachable("unauthorized");
        assert_eq!(classify(&failure), FailureClass::NetworkFailure);
    }

    #[test]
    fn test_policy_split() {
        assert!(FailureClass::NetworkFailure.halts_pass());
        assert!(FailureClass::AuthFailure.halts_pass());
        assert!(!FailureClass::ServerFailure.halts_pass());

        assert!(!FailureClass::NetworkFailure.consumes_retry());
        assert!(!FailureClass::AuthFailure.consumes_retry());
        assert!(FailureClass::ServerFailure.consumes_retry());
    }
}
