//! Progress reporting service
//!
//! Service callbacks carry free-form phase keys. They are mapped once onto the
//! closed [`Phase`] enumeration here; everything downstream works on `Phase`.

use instant::Instant;
use serde::{Deserialize, Serialize};

/// Stage of the background removal service that is making progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Model weights are being downloaded
    FetchModel,
    /// The model is running on the image
    ComputeInference,
    /// Any other stage
    Other,
}

/// Phase keys emitted by the service and the phase each one maps to
const PHASE_KEYS: &[(&str, Phase)] = &[
    ("fetch:model", Phase::FetchModel),
    ("compute:inference", Phase::ComputeInference),
];

impl Phase {
    /// Map a service phase key; unknown keys are [`Phase::Other`]
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        PHASE_KEYS
            .iter()
            .find(|(known, _)| *known == key)
            .map_or(Phase::Other, |(_, phase)| *phase)
    }

    /// Human-readable label for this phase
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Phase::FetchModel => "downloading model",
            Phase::ComputeInference => "analyzing background",
            Phase::Other => "processing",
        }
    }
}

/// Convert a (current, total) pair to a whole percentage in 0..=100
///
/// A zero total yields 0.
#[must_use]
pub fn progress_percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = current as f64 / total as f64 * 100.0;
    ratio.round().clamp(0.0, 100.0) as u8
}

/// Status line shown next to the progress indicator
#[must_use]
pub fn status_label(phase: Phase, percent: u8) -> String {
    format!("{}... {}%", phase.label(), percent)
}

/// Progress update for one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// Generation of the job this update belongs to
    pub generation: u64,
    /// Phase reported by the service
    pub phase: Phase,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Status label derived from phase and progress
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Build an update from a raw service callback
    #[must_use]
    pub fn from_callback(
        generation: u64,
        key: &str,
        current: u64,
        total: u64,
        start_time: Instant,
    ) -> Self {
        let phase = Phase::from_key(key);
        let progress = progress_percent(current, total);
        Self {
            generation,
            phase,
            progress,
            description: status_label(phase, progress),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Trait for observing job progress outside the controller
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: &ProgressUpdate);

    /// Report that a job produced its result
    fn report_completion(&self, generation: u64, elapsed_ms: u64);

    /// Report that a job failed
    fn report_error(&self, generation: u64, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: &ProgressUpdate) {}

    fn report_completion(&self, _generation: u64, _elapsed_ms: u64) {}

    fn report_error(&self, _generation: u64, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include job generation and timing
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: &ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[job {}] [{}%] {} ({}ms elapsed)",
                update.generation,
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, generation: u64, elapsed_ms: u64) {
        if self.verbose {
            log::info!("✅ Job {} completed in {}ms", generation, elapsed_ms);
        } else {
            log::info!("✅ Background removal completed in {}ms", elapsed_ms);
        }
    }

    fn report_error(&self, generation: u64, error: &str) {
        log::error!("❌ Job {} failed: {}", generation, error);
    }
}
