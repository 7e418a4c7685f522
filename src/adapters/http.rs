//! HTTP uploader for the remote recordings API.
//!
//! Posts the audio as a multipart form with its metadata. Transport errors
//! map to `Unreachable`, 401/403 to `Unauthorized`, everything else to
//! `Rejected`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use super::{RemoteRecord, Uploader};
use crate::config::UploaderSettings;
use crate::domain::{FailureKind, UploadFailure};

/// Uploads recordings over HTTP
pub struct HttpUploader {
    /// Upload endpoint URL
    endpoint: String,
    /// Bearer token, if the endpoint wants one
    token: Option<String>,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpUploader {
    /// Create a new uploader
    pub fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    /// Create from resolved settings
    pub fn from_settings(settings: &UploaderSettings, token: Option<String>) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .context("No upload endpoint configured. Set uploader.endpoint or VOICEDROP_ENDPOINT")?;

        Self::new(endpoint, token, Duration::from_secs(settings.timeout_seconds))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a transport error to a failure kind
fn transport_kind(err: &reqwest::Error) -> FailureKind {
    if err.is_connect() || err.is_timeout() {
        FailureKind::Unreachable
    } else if let Some(status) = err.status() {
        status_kind(status)
    } else {
        FailureKind::Rejected
    }
}

/// Map a non-success HTTP status to a failure kind
fn status_kind(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Unauthorized,
        _ => FailureKind::Rejected,
    }
}

fn transport_failure(err: reqwest::Error) -> UploadFailure {
    UploadFailure::new(transport_kind(&err), err.to_string())
}

#[async_trait]
impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(
        &self,
        locator: &Path,
        duration_seconds: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<RemoteRecord, UploadFailure> {
        let file_name = locator
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        // A missing artifact will not appear by retrying the network
        let bytes = tokio::fs::read(locator).await.map_err(|e| {
            UploadFailure::rejected(format!("Failed to read {}: {}", locator.display(), e))
        })?;

        let audio = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mp4")
            .map_err(transport_failure)?;

        let form = Form::new()
            .part("audio", audio)
            .text("duration_seconds", duration_seconds.to_string())
            .text(
                "recorded_at",
                recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            );

        let response = self
            .authorize(self.client.post(&self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UploadFailure::new(
                status_kind(status),
                format!("Upload rejected ({}): {}", status, text.trim()),
            ));
        }

        response.json::<RemoteRecord>().await.map_err(|e| {
            UploadFailure::rejected(format!("Unexpected upload response: {}", e))
        })
    }

    async fn health_check(&self) -> Result<(), UploadFailure> {
        // Any HTTP answer at all means the server is reachable
        self.authorize(self.client.head(&self.endpoint))
            .send()
            .await
            .map(|_| ())
            .map_err(transport_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uploader() -> HttpUploader {
        HttpUploader::new(
            "http://127.0.0.1:9/recordings".to_string(),
            Some("TOKEN".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(status_kind(StatusCode::UNAUTHORIZED), FailureKind::Unauthorized);
        assert_eq!(status_kind(StatusCode::FORBIDDEN), FailureKind::Unauthorized);
        assert_eq!(status_kind(StatusCode::INTERNAL_SERVER_ERROR), FailureKind::Rejected);
        assert_eq!(status_kind(StatusCode::UNPROCESSABLE_ENTITY), FailureKind::Rejected);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_rejected() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone.m4a");

        let failure = uploader()
            .upload(&missing, 12.0, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Rejected);
        assert!(failure.message.contains("gone.m4a"));
    }

    #[test]
    fn test_from_settings_requires_endpoint() {
        let settings = UploaderSettings {
            endpoint: None,
            timeout_seconds: 30,
        };
        assert!(HttpUploader::from_settings(&settings, None).is_err());

        let settings = UploaderSettings {
            endpoint: Some("https://api.example.com/recordings".to_string()),
            timeout_seconds: 30,
        };
        let uploader = HttpUploader::from_settings(&settings, None).unwrap();
        assert_eq!(uploader.endpoint(), "https://api.example.com/recordings");
    }
}
