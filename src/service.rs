//! Background removal service abstraction
//!
//! The controller never removes backgrounds itself. It hands a validated
//! [`SourceFile`] to a [`BackgroundRemovalService`] and receives the result
//! image back; any conforming implementation (local model, remote API) can be
//! plugged in.

use crate::source::SourceFile;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Image returned by a background removal service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    /// Wrap PNG bytes
    #[must_use]
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }
}

type ProgressSink = dyn Fn(u64, &str, u64, u64) + Send + Sync;

/// Progress callback handed to a service for one job
///
/// Every report is tagged with the generation of the job that created the
/// callback, so the receiving side can drop reports from superseded jobs.
#[derive(Clone)]
pub struct ProgressCallback {
    generation: u64,
    sink: Arc<ProgressSink>,
}

impl ProgressCallback {
    pub fn new<F>(generation: u64, sink: F) -> Self
    where
        F: Fn(u64, &str, u64, u64) + Send + Sync + 'static,
    {
        Self {
            generation,
            sink: Arc::new(sink),
        }
    }

    /// Callback that ignores every report
    #[must_use]
    pub fn noop() -> Self {
        Self::new(0, |_, _, _, _| {})
    }

    /// Report progress of `phase_key` as `current` out of `total`
    pub fn report(&self, phase_key: &str, current: u64, total: u64) {
        (self.sink)(self.generation, phase_key, current, total);
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressCallback")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Capability interface of a background removal service
#[async_trait]
pub trait BackgroundRemovalService: Send + Sync {
    /// Remove the background from `source`
    ///
    /// Implementations may call `progress` any number of times while working.
    ///
    /// # Errors
    /// Any failure (network, decode, out of memory). Callers do not inspect
    /// the error beyond logging it.
    async fn remove_background(
        &self,
        source: &SourceFile,
        progress: ProgressCallback,
    ) -> anyhow::Result<ImageBlob>;

    /// Short name used in logs
    fn name(&self) -> &str;
}
