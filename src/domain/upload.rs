//! Queued uploads and their lifecycle status.
//!
//! A `QueuedUpload` is one pending delivery obligation. Delivered items are
//! removed from the queue rather than moved to a terminal state, so the only
//! statuses are pending, uploading and failed.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of failed attempts after which an item is exhausted.
pub const MAX_RETRIES: u32 = 3;

/// Unique identifier of a queued upload, assigned at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form for log lines and listings
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally captured recording awaiting delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the recording's bytes live
    pub locator: PathBuf,

    /// Recording length in seconds
    pub duration_seconds: f64,

    /// When the recording was captured
    pub recorded_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(locator: impl Into<PathBuf>, duration_seconds: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            locator: locator.into(),
            // Negative durations are clamped; the field is metadata only
            duration_seconds: duration_seconds.max(0.0),
            recorded_at,
        }
    }

    /// File name of the locator, for display
    pub fn file_name(&self) -> String {
        self.locator
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// Status of a queued upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Waiting for the next processing pass
    Pending,

    /// Handed to the uploader by the active pass
    Uploading,

    /// Last attempt was rejected by the server
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// One pending delivery obligation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedUpload {
    /// Immutable identifier
    pub id: UploadId,

    /// Reference to the local artifact
    pub locator: PathBuf,

    /// Recording length in seconds
    pub duration_seconds: f64,

    /// When the recording was captured (ISO 8601)
    pub recorded_at: DateTime<Utc>,

    /// Current status
    pub status: UploadStatus,

    /// Number of server-rejected attempts
    pub retry_count: u32,

    /// Diagnostic from the last transition that carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedUpload {
    /// Create a fresh pending item for an artifact
    pub fn new(artifact: Artifact) -> Self {
        Self {
            id: UploadId::new(),
            locator: artifact.locator,
            duration_seconds: artifact.duration_seconds,
            recorded_at: artifact.recorded_at,
            status: UploadStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Whether the retry budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }

    /// Whether a processing pass may pick this item up
    pub fn is_eligible(&self) -> bool {
        matches!(self.status, UploadStatus::Pending | UploadStatus::Failed) && !self.is_exhausted()
    }

    /// The artifact this item delivers
    pub fn artifact(&self) -> Artifact {
        Artifact {
            locator: self.locator.clone(),
            duration_seconds: self.duration_seconds,
            recorded_at: self.recorded_at,
        }
    }

    /// File name of the locator, for display
    pub fn file_name(&self) -> String {
        self.locator
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}
