//! Intake and job lifecycle controller
//!
//! One controller owns at most one job at a time and walks it through
//!
//! ```text
//! Idle --intake ok--> Loaded --process--> Processing --success--> Done
//!   ^                                          |--failure--> Error
//!   |______________________ reset (from any state) __________|
//! ```
//!
//! Each intake and each reset bumps the job generation. Progress reports,
//! preview renders and service completions carry the generation they were
//! started under and are dropped when it is no longer current, so a reset
//! job can never write into its successor.

use crate::artifact::{download_filename, ArtifactInfo, HandleRegistry, ResultArtifact};
use crate::backends::create_service;
use crate::config::IntakeConfig;
use crate::error::{ErrorKind, IntakeError, Result};
use crate::service::{BackgroundRemovalService, ProgressCallback};
use crate::services::{FileIOService, NoOpProgressReporter, ProgressReporter, ProgressUpdate};
use crate::source::{self, RawFile, SourceFile, SourcePreview};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

/// Label shown while the service has not reported anything yet
const STARTING_LABEL: &str = "loading model...";
/// Label shown once the result is available
const DONE_LABEL: &str = "done";
/// Label shown after a failed attempt
const FAILED_LABEL: &str = "an error occurred while processing";

/// State of the current job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Loaded,
    Processing,
    Done,
    Error,
}

impl JobState {
    /// Whether a source preview exists in this state
    #[must_use]
    pub fn has_preview(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the job, as a UI would render it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,
    pub generation: u64,
    pub progress_percent: u8,
    pub status_label: String,
    pub source_name: Option<String>,
    pub preview: Option<Arc<SourcePreview>>,
    pub artifact: Option<ArtifactInfo>,
    pub error: Option<ErrorKind>,
    /// Intake controls are enabled
    pub intake_enabled: bool,
    /// Download action is enabled
    pub download_enabled: bool,
}

#[derive(Debug)]
struct Job {
    state: JobState,
    generation: u64,
    progress_percent: u8,
    status_label: String,
    source: Option<SourceFile>,
    preview: Option<Arc<SourcePreview>>,
    artifact: Option<ResultArtifact>,
    error: Option<ErrorKind>,
}

impl Job {
    fn new() -> Self {
        Self {
            state: JobState::Idle,
            generation: 0,
            progress_percent: 0,
            status_label: String::new(),
            source: None,
            preview: None,
            artifact: None,
            error: None,
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            state: self.state,
            generation: self.generation,
            progress_percent: self.progress_percent,
            status_label: self.status_label.clone(),
            source_name: self.source.as_ref().map(|s| s.name().to_string()),
            preview: self.preview.clone(),
            artifact: self.artifact.as_ref().map(ResultArtifact::info),
            error: self.error,
            intake_enabled: self.state == JobState::Idle,
            download_enabled: self.state == JobState::Done,
        }
    }

    /// Return to Idle, releasing everything the previous job held
    fn clear(&mut self) {
        self.generation += 1;
        self.state = JobState::Idle;
        self.progress_percent = 0;
        self.status_label.clear();
        self.source = None;
        self.preview = None;
        self.artifact = None;
        self.error = None;
    }
}

/// State shared with progress callbacks and preview tasks
struct Shared {
    job: Mutex<Job>,
    updates: watch::Sender<JobSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, job: &Job) {
        self.updates.send_replace(job.snapshot());
    }
}

/// Controller for the intake → process → download lifecycle
///
/// # Examples
/// ```rust,no_run
/// use imgly_bgremove_intake::{IntakeConfig, JobController, RawFile};
///
/// # async fn example(bytes: Vec<u8>) -> imgly_bgremove_intake::Result<()> {
/// let controller = JobController::from_config(IntakeConfig::default())?;
/// controller.intake(RawFile::new("photo.jpg", "image/jpeg", bytes))?;
/// controller.process().await?;
/// if let Some(path) = controller.download(None).await? {
///     println!("saved {}", path.display());
/// }
/// controller.reset();
/// # Ok(())
/// # }
/// ```
pub struct JobController {
    config: IntakeConfig,
    service: Arc<dyn BackgroundRemovalService>,
    reporter: Arc<dyn ProgressReporter>,
    registry: HandleRegistry,
    shared: Arc<Shared>,
}

impl JobController {
    /// Create a controller around an explicit service
    #[must_use]
    pub fn new(config: IntakeConfig, service: Arc<dyn BackgroundRemovalService>) -> Self {
        let job = Job::new();
        let (updates, _) = watch::channel(job.snapshot());
        Self {
            config,
            service,
            reporter: Arc::new(NoOpProgressReporter),
            registry: HandleRegistry::new(),
            shared: Arc::new(Shared {
                job: Mutex::new(job),
                updates,
            }),
        }
    }

    /// Create a controller with the service selected in `config`
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Service cannot be created
    pub fn from_config(config: IntakeConfig) -> Result<Self> {
        config.validate()?;
        let service = create_service(&config.service)?;
        Ok(Self::new(config, service))
    }

    /// Attach a progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Registry tracking the handles of result artifacts
    #[must_use]
    pub fn handles(&self) -> &HandleRegistry {
        &self.registry
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.lock().snapshot()
    }

    /// Receive a snapshot after every change of the job
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Check a raw file against the configured limits without touching the job
    ///
    /// # Errors
    /// - `UnsupportedType` or `TooLarge`
    pub fn validate(&self, raw: &RawFile) -> Result<SourceFile> {
        source::validate(raw, &self.config)
    }

    /// Accept a file and move the job from Idle to Loaded
    ///
    /// The preview is rendered on a blocking task when called inside a tokio
    /// runtime, and inline otherwise. Until then the snapshot carries a
    /// pending preview.
    ///
    /// # Errors
    /// - `Busy` while a job is processing
    /// - `InvalidState` when a previous job has not been reset
    /// - `UnsupportedType` or `TooLarge`; the job stays Idle
    pub fn intake(&self, raw: RawFile) -> Result<SourceFile> {
        let mut job = self.shared.lock();
        match job.state {
            JobState::Idle => {},
            JobState::Processing => {
                tracing::warn!(file = raw.name(), "Intake refused while processing");
                return Err(IntakeError::Busy);
            },
            other => {
                return Err(IntakeError::invalid_state(format!(
                    "cannot accept a file while {}; reset first",
                    other
                )));
            },
        }

        let source = match source::validate(&raw, &self.config) {
            Ok(source) => source,
            Err(e) => {
                tracing::info!(
                    file = raw.name(),
                    declared_type = raw.declared_type(),
                    size_bytes = raw.size_bytes(),
                    error = %e,
                    "Rejected file at intake"
                );
                return Err(e);
            },
        };

        job.generation += 1;
        job.state = JobState::Loaded;
        job.progress_percent = 0;
        job.status_label.clear();
        job.error = None;
        job.preview = Some(Arc::new(SourcePreview::pending()));
        job.source = Some(source.clone());
        let generation = job.generation;
        self.shared.publish(&job);
        drop(job);

        tracing::info!(
            generation,
            file = source.name(),
            mime_type = %source.mime_type(),
            size_bytes = source.size_bytes(),
            "Accepted file"
        );
        self.render_preview(generation, &source);
        Ok(source)
    }

    fn render_preview(&self, generation: u64, source: &SourceFile) {
        let source = source.clone();
        let shared = Arc::downgrade(&self.shared);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match tokio::task::spawn_blocking(move || SourcePreview::render(&source)).await {
                        Ok(preview) => apply_preview(&shared, generation, preview),
                        Err(e) => tracing::warn!(generation, error = %e, "Preview render task failed"),
                    }
                });
            },
            Err(_) => apply_preview(&shared, generation, SourcePreview::render(&source)),
        }
    }

    /// Run the loaded source through the service
    ///
    /// Moves the job to Processing right away and to Done or Error once the
    /// service settles. Failures are not retried.
    ///
    /// # Errors
    /// - `InvalidState` unless the job is Loaded; the service is not called
    /// - `ProcessingFailed` when the service fails; the job is in Error
    /// - `Superseded` when the job was reset before the service settled
    pub async fn process(&self) -> Result<ArtifactInfo> {
        let (generation, source) = {
            let mut job = self.shared.lock();
            if job.state != JobState::Loaded {
                return Err(IntakeError::invalid_state(format!(
                    "cannot process while {}",
                    job.state
                )));
            }
            let source = job
                .source
                .clone()
                .ok_or_else(|| IntakeError::invalid_state("loaded job has no source"))?;
            job.state = JobState::Processing;
            job.progress_percent = 0;
            job.status_label = STARTING_LABEL.to_string();
            job.error = None;
            self.shared.publish(&job);
            (job.generation, source)
        };

        tracing::info!(generation, service = self.service.name(), "Processing started");
        let started = Instant::now();
        let callback = self.progress_callback(generation, started);
        let outcome = self.service.remove_background(&source, callback).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut job = self.shared.lock();
        if job.generation != generation {
            tracing::debug!(
                generation,
                current = job.generation,
                "Discarding result of superseded job"
            );
            return Err(IntakeError::Superseded { generation });
        }

        match outcome {
            Ok(blob) => {
                // Release the previous handle before acquiring the new one
                job.artifact = None;
                let artifact =
                    ResultArtifact::create(&self.registry, blob.bytes, blob.mime_type, generation);
                if !artifact.is_png() {
                    tracing::warn!(generation, "Service result does not look like a PNG");
                }
                let info = artifact.info();
                job.artifact = Some(artifact);
                job.state = JobState::Done;
                job.progress_percent = 100;
                job.status_label = DONE_LABEL.to_string();
                self.shared.publish(&job);
                drop(job);

                tracing::info!(generation, elapsed_ms, size_bytes = info.size_bytes, "Processing done");
                self.reporter.report_completion(generation, elapsed_ms);
                Ok(info)
            },
            Err(e) => {
                job.artifact = None;
                job.state = JobState::Error;
                job.status_label = FAILED_LABEL.to_string();
                job.error = Some(ErrorKind::ProcessingFailed);
                self.shared.publish(&job);
                drop(job);

                let detail = format!("{:#}", e);
                tracing::error!(generation, elapsed_ms, error = %detail, "Background removal failed");
                self.reporter.report_error(generation, &detail);
                Err(IntakeError::ProcessingFailed(detail))
            },
        }
    }

    fn progress_callback(&self, generation: u64, started: Instant) -> ProgressCallback {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let reporter = Arc::clone(&self.reporter);
        ProgressCallback::new(generation, move |tag, key, current, total| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let update = ProgressUpdate::from_callback(tag, key, current, total, started);
            {
                let mut job = shared.lock();
                if job.generation != tag || job.state != JobState::Processing {
                    tracing::trace!(tag, current = job.generation, "Ignoring stale progress");
                    return;
                }
                job.progress_percent = update.progress;
                job.status_label.clone_from(&update.description);
                shared.publish(&job);
            }
            reporter.report_progress(&update);
        })
    }

    /// Intake a file and process it straight away
    ///
    /// # Errors
    /// Any error of [`intake`](Self::intake) or [`process`](Self::process).
    pub async fn submit(&self, raw: RawFile) -> Result<ArtifactInfo> {
        self.intake(raw)?;
        self.process().await
    }

    /// Write the result to `dir` (or the configured download directory)
    ///
    /// Returns `Ok(None)` without doing anything unless the job is Done. The
    /// job state is not changed.
    ///
    /// # Errors
    /// - Download directory or file cannot be written
    pub async fn download(&self, dir: Option<&Path>) -> Result<Option<PathBuf>> {
        let bytes = {
            let job = self.shared.lock();
            match (&job.state, &job.artifact) {
                (JobState::Done, Some(artifact)) => artifact.shared_bytes(),
                _ => {
                    tracing::debug!(state = %job.state, "Download ignored, no result");
                    return Ok(None);
                },
            }
        };

        let dir = dir.map_or_else(|| self.config.resolve_download_dir(), Path::to_path_buf);
        let file_name = download_filename(
            &self.config.download_prefix,
            chrono::Utc::now().timestamp_millis(),
        );
        let path = FileIOService::write_download(&dir, &file_name, &bytes).await?;
        Ok(Some(path))
    }

    /// Return to Idle from any state
    ///
    /// Releases the result handle, clears preview, progress and status, and
    /// invalidates everything still running for the previous job.
    pub fn reset(&self) {
        let mut job = self.shared.lock();
        let previous = job.state;
        job.clear();
        self.shared.publish(&job);
        tracing::info!(previous = %previous, generation = job.generation, "Job reset");
    }
}

impl fmt::Debug for JobController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobController")
            .field("service", &self.service.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn apply_preview(shared: &Weak<Shared>, generation: u64, preview: SourcePreview) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut job = shared.lock();
    if job.generation != generation || job.preview.is_none() {
        tracing::trace!(generation, current = job.generation, "Ignoring stale preview");
        return;
    }
    job.preview = Some(Arc::new(preview));
    shared.publish(&job);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockService;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(8, 6, image::Rgba([10, 20, 30, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn controller(service: MockService) -> (JobController, Arc<MockService>) {
        let service = Arc::new(service);
        let controller = JobController::new(IntakeConfig::default(), service.clone());
        (controller, service)
    }

    #[test]
    fn test_starts_idle() {
        let (controller, _) = controller(MockService::new());
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, JobState::Idle);
        assert_eq!(snapshot.progress_percent, 0);
        assert!(snapshot.preview.is_none());
        assert!(snapshot.intake_enabled);
        assert!(!snapshot.download_enabled);
    }

    #[test]
    fn test_intake_outside_runtime_renders_inline() {
        let (controller, _) = controller(MockService::new());
        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, JobState::Loaded);
        assert_eq!(snapshot.generation, 1);
        let preview = snapshot.preview.unwrap();
        assert!(preview.is_rendered());
        assert_eq!(preview.dimensions, Some((8, 6)));
        assert!(!snapshot.intake_enabled);
    }

    #[test]
    fn test_snapshots_share_preview() {
        let (controller, _) = controller(MockService::new());
        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();
        let updates = controller.subscribe();

        // Progress reports republish the job; the preview must not be copied
        let callback = controller.progress_callback(controller.snapshot().generation, Instant::now());
        controller.shared.lock().state = JobState::Processing;
        callback.report("compute:inference", 1, 2);

        let published = updates.borrow().clone();
        assert_eq!(published.progress_percent, 50);
        let first = controller.snapshot().preview.unwrap();
        let second = published.preview.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_rejected_intake_keeps_idle() {
        let (controller, service) = controller(MockService::new());
        let err = controller
            .intake(RawFile::new("a.gif", "image/gif", vec![0u8; 1024]))
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedType { .. }));
        assert_eq!(controller.state(), JobState::Idle);
        assert_eq!(controller.snapshot().generation, 0);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_intake_requires_reset_after_load() {
        let (controller, _) = controller(MockService::new());
        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();
        let err = controller
            .intake(RawFile::new("b.png", "image/png", png_bytes()))
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidState(_)));
        assert_eq!(controller.snapshot().source_name.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn test_process_requires_loaded() {
        let (controller, service) = controller(MockService::new());
        let err = controller.process().await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidState(_)));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn test_process_success() {
        let (controller, service) = controller(MockService::new());
        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();

        let info = controller.process().await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, JobState::Done);
        assert_eq!(snapshot.progress_percent, 100);
        assert_eq!(snapshot.status_label, DONE_LABEL);
        assert_eq!(snapshot.artifact, Some(info.clone()));
        assert!(snapshot.download_enabled);
        assert_eq!(controller.handles().live_count(), 1);
        assert!(controller.handles().is_live(&info.url));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_process_failure() {
        let (controller, service) = controller(MockService::new().failing());
        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();

        let err = controller.process().await.unwrap_err();
        assert!(matches!(err, IntakeError::ProcessingFailed(_)));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, JobState::Error);
        assert_eq!(snapshot.error, Some(ErrorKind::ProcessingFailed));
        assert_eq!(snapshot.status_label, FAILED_LABEL);
        assert!(snapshot.artifact.is_none());
        assert!(snapshot.preview.is_some());
        assert_eq!(controller.handles().live_count(), 0);

        // No automatic retry, and no manual retry without reset
        assert!(matches!(
            controller.process().await,
            Err(IntakeError::InvalidState(_))
        ));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (controller, _) = controller(MockService::new());
        controller
            .submit(RawFile::new("a.png", "image/png", png_bytes()))
            .await
            .unwrap();
        assert_eq!(controller.handles().live_count(), 1);

        controller.reset();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, JobState::Idle);
        assert_eq!(snapshot.progress_percent, 0);
        assert!(snapshot.status_label.is_empty());
        assert!(snapshot.preview.is_none());
        assert!(snapshot.artifact.is_none());
        assert!(snapshot.source_name.is_none());
        assert_eq!(controller.handles().live_count(), 0);
    }

    #[tokio::test]
    async fn test_download_noop_unless_done() {
        let (controller, _) = controller(MockService::new());
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(controller.download(Some(dir.path())).await.unwrap(), None);

        controller
            .intake(RawFile::new("a.png", "image/png", png_bytes()))
            .unwrap();
        assert_eq!(controller.download(Some(dir.path())).await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_controller_releases_handle() {
        let (controller, _) = controller(MockService::new());
        let registry = controller.handles().clone();
        controller
            .submit(RawFile::new("a.png", "image/png", png_bytes()))
            .await
            .unwrap();
        assert_eq!(registry.live_count(), 1);

        drop(controller);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Processing.to_string(), "processing");
        assert!(!JobState::Idle.has_preview());
        assert!(JobState::Error.has_preview());
    }
}
