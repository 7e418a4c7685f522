//! Core queue logic.
//!
//! This module contains:
//! - Classifier: maps uploader failures to retry policy classes
//! - Recovery: repairs items interrupted by an abrupt shutdown
//! - QueueState: the serialized, write-through in-memory queue
//! - QueueProcessor: single-flight FIFO processing passes
//! - UploadQueue: the facade wiring state, processor and collaborators
//! - Triggers: event-driven pass scheduling and connectivity probing

pub mod classifier;
pub mod processor;
pub mod queue;
pub mod recovery;
pub mod state;
pub mod triggers;

// Re-export commonly used types
pub use classifier::{classify, FailureClass};
pub use processor::{PassReport, PassStats, QueueProcessor, SkipReason, UPLOAD_ABANDONED};
pub use queue::{SubmitError, SubmitOutcome, UploadQueue};
pub use recovery::{recover, INTERRUPTED_BY_RESTART};
pub use state::{PassGuard, QueueError, QueueState, QueueSummary};
pub use triggers::{ConnectivityProbe, TaskHandle, Trigger, TriggerLoop, TriggerSender};
