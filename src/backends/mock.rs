//! Mock service implementation for testing and demos

use crate::service::{BackgroundRemovalService, ImageBlob, ProgressCallback};
use crate::source::SourceFile;
use anyhow::Context;
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Colour distance below which a pixel counts as background
const BACKGROUND_TOLERANCE: u32 = 48;

/// In-process service that needs no model
///
/// Emits `fetch:model` and `compute:inference` progress, then makes every
/// pixel close in colour to the top-left pixel transparent and returns the
/// result as PNG. Formats whose decoder is not compiled in fail the same way a
/// real service fails on undecodable input.
#[derive(Debug)]
pub struct MockService {
    steps: u64,
    step_delay: Duration,
    fail: bool,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl MockService {
    /// Create a new mock service reporting 4 steps per phase
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: 4,
            step_delay: Duration::ZERO,
            fail: false,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long after each progress report
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Number of progress reports per phase (at least 1)
    #[must_use]
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps.max(1);
        self
    }

    /// Fail every request after reporting progress
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Hold every request between model download and inference until `gate`
    /// is notified
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// How many times the service has been invoked
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run_phase(&self, key: &str, progress: &ProgressCallback) {
        for step in 0..=self.steps {
            progress.report(key, step, self.steps);
            if self.step_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.step_delay).await;
            }
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundRemovalService for MockService {
    async fn remove_background(
        &self,
        source: &SourceFile,
        progress: ProgressCallback,
    ) -> anyhow::Result<ImageBlob> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.run_phase("fetch:model", &progress).await;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.run_phase("compute:inference", &progress).await;

        if self.fail {
            anyhow::bail!("mock service configured to fail");
        }

        let bytes = source.shared_bytes();
        let png = tokio::task::spawn_blocking(move || cut_out(&bytes))
            .await
            .context("mock cut-out task panicked")??;
        Ok(ImageBlob::png(png))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Make pixels resembling the top-left corner transparent and encode as PNG
fn cut_out(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut rgba = image::load_from_memory(bytes)
        .context("failed to decode source image")?
        .to_rgba8();

    if let Some(&corner) = rgba.get_pixel_checked(0, 0) {
        for pixel in rgba.pixels_mut() {
            let distance: u32 = pixel
                .0
                .iter()
                .zip(corner.0.iter())
                .take(3)
                .map(|(a, b)| u32::from(a.abs_diff(*b)))
                .sum();
            if distance < BACKGROUND_TOLERANCE {
                pixel.0[3] = 0;
            }
        }
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .context("failed to encode result as PNG")?;
    Ok(out)
}
