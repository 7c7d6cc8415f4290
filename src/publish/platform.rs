// src/publish/platform.rs
//
// HTTP client for the publishing platform. The publisher core never sees
// raw HTTP: this layer maps 429 + reset hints and duplicate-content
// rejections into typed errors.

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform rate limit, reset in {reset_secs}s")]
    RateLimited { reset_secs: u64 },

    #[error("platform rejected duplicate content")]
    Duplicate,

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PublishPlatform: Send + Sync {
    /// Create a post, optionally with a pre-uploaded media file.
    async fn create_post(&self, text: &str, media: Option<&Path>)
        -> Result<(), PlatformError>;

    /// Cheap read-only call proving the credentials still work.
    async fn verify(&self) -> Result<(), PlatformError>;
}

pub struct PlatformClient {
    endpoint: String,
    media_endpoint: String,
    verify_endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(
        endpoint: String,
        media_endpoint: String,
        verify_endpoint: String,
        token: String,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            endpoint,
            media_endpoint,
            verify_endpoint,
            token,
            client,
        }
    }

    async fn upload_media(&self, path: &Path) -> Result<String, PlatformError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PlatformError::Unavailable(format!("read media: {e}")))?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("media.jpg")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| PlatformError::Unavailable(format!("media part: {e}")))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let resp = self
            .client
            .post(&self.media_endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("media upload: {e}")))?;

        let resp = map_status(resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("media upload body: {e}")))?;
        body.get("media_id")
            .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| v.as_u64().map(|n| n.to_string())))
            .ok_or_else(|| PlatformError::Unavailable("media upload: no media_id".to_string()))
    }
}

/// Surface 429 with its reset hint and duplicate-content rejections; pass
/// successful responses through.
async fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status.as_u16() == 429 {
        let reset_secs = resp
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|reset_ts| reset_ts.saturating_sub(Utc::now().timestamp()).max(0) as u64)
            .unwrap_or(60);
        return Err(PlatformError::RateLimited { reset_secs });
    }

    let body = resp.text().await.unwrap_or_default();
    if body.to_ascii_lowercase().contains("duplicate") {
        return Err(PlatformError::Duplicate);
    }
    Err(PlatformError::Unavailable(format!("{status}: {body}")))
}

#[async_trait]
impl PublishPlatform for PlatformClient {
    async fn create_post(
        &self,
        text: &str,
        media: Option<&Path>,
    ) -> Result<(), PlatformError> {
        let mut payload = serde_json::json!({ "text": text });
        if let Some(path) = media {
            let media_id = self.upload_media(path).await?;
            payload["media_ids"] = serde_json::json!([media_id]);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("create post: {e}")))?;

        map_status(resp).await.map(|_| ())
    }

    async fn verify(&self) -> Result<(), PlatformError> {
        // Unconfigured check endpoint: nothing meaningful to probe.
        if self.verify_endpoint.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .get(&self.verify_endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("verify: {e}")))?;
        map_status(resp).await.map(|_| ())
    }
}
