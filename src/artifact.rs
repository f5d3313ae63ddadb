//! Result artifacts and their transient resource handles
//!
//! A result is shown and downloaded through a handle (the `blob:` URL a
//! browser would create). Handles are registered in a [`HandleRegistry`] and
//! released when dropped, so an artifact can never outlive its owner without
//! its handle being returned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Registry of live artifact handles
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashSet<String>>>,
}

impl HandleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle
    #[must_use]
    pub fn acquire(&self) -> ArtifactHandle {
        let url = format!("blob:{}", Uuid::new_v4());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        tracing::trace!(url = %url, "Acquired artifact handle");
        ArtifactHandle {
            url,
            registry: self.clone(),
        }
    }

    /// Number of handles not yet released
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_live(&self, url: &str) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    fn release(&self, url: &str) {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        if removed {
            tracing::trace!(url = %url, "Released artifact handle");
        }
    }
}

/// A live handle; released when dropped
#[derive(Debug)]
pub struct ArtifactHandle {
    url: String,
    registry: HandleRegistry,
}

impl ArtifactHandle {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        self.registry.release(&self.url);
    }
}

/// Serializable description of a result artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

/// Background-removed image owned by the controller
#[derive(Debug)]
pub struct ResultArtifact {
    bytes: Arc<[u8]>,
    mime_type: String,
    sha256: String,
    generation: u64,
    created_at: DateTime<Utc>,
    handle: ArtifactHandle,
}

impl ResultArtifact {
    /// Take ownership of result bytes and acquire a handle for them
    #[must_use]
    pub fn create(registry: &HandleRegistry, bytes: Vec<u8>, mime_type: String, generation: u64) -> Self {
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        Self {
            bytes: Arc::from(bytes),
            mime_type,
            sha256,
            generation,
            created_at: Utc::now(),
            handle: registry.acquire(),
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.handle.url()
    }

    /// Whether the bytes start with the PNG signature
    #[must_use]
    pub fn is_png(&self) -> bool {
        self.bytes.starts_with(b"\x89PNG\r\n\x1a\n")
    }

    #[must_use]
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            url: self.handle.url().to_string(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.bytes.len() as u64,
            sha256: self.sha256.clone(),
            generation: self.generation,
            created_at: self.created_at,
        }
    }
}

/// File name for a download: `<prefix>_<unix millis>.png`
#[must_use]
pub fn download_filename(prefix: &str, timestamp_ms: i64) -> String {
    format!("{}_{}.png", prefix, timestamp_ms)
}
