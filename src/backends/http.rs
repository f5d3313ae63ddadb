//! Remote background removal over HTTP
//!
//! Posts the source bytes to an endpoint and streams back the result image.
//! The request itself is reported as `compute:inference`; the response body
//! download is reported as `fetch:result` when its length is known.

use crate::service::{BackgroundRemovalService, ImageBlob, ProgressCallback};
use crate::source::SourceFile;
use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Largest response body accepted from the service (64 MiB)
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Service backed by a remote HTTP API
#[derive(Debug)]
pub struct HttpService {
    client: Client,
    endpoint: String,
    max_response_bytes: u64,
}

impl HttpService {
    /// Create a new HTTP service
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_response_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// Reject responses larger than `limit` bytes
    #[must_use]
    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BackgroundRemovalService for HttpService {
    async fn remove_background(
        &self,
        source: &SourceFile,
        progress: ProgressCallback,
    ) -> anyhow::Result<ImageBlob> {
        log::debug!("Posting {} bytes to {}", source.size_bytes(), self.endpoint);
        progress.report("compute:inference", 0, 1);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, source.mime_type().as_str())
            .body(source.bytes().to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error {} from {}", status, self.endpoint);
        }
        progress.report("compute:inference", 1, 1);

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let total_size = response.content_length();
        if let Some(total) = total_size.filter(|&total| total > self.max_response_bytes) {
            anyhow::bail!(
                "Response of {} bytes exceeds limit of {} bytes",
                total,
                self.max_response_bytes
            );
        }

        let mut bytes = Vec::with_capacity(total_size.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read response stream")?;
            if (bytes.len() + chunk.len()) as u64 > self.max_response_bytes {
                anyhow::bail!(
                    "Response exceeds limit of {} bytes",
                    self.max_response_bytes
                );
            }
            bytes.extend_from_slice(&chunk);
            if let Some(total) = total_size {
                progress.report("fetch:result", bytes.len() as u64, total);
            }
        }

        if bytes.is_empty() {
            anyhow::bail!("Empty response from {}", self.endpoint);
        }

        log::debug!("Received {} bytes ({})", bytes.len(), mime_type);
        Ok(ImageBlob { bytes, mime_type })
    }

    fn name(&self) -> &str {
        "http"
    }
}
