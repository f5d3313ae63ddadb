#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Background Removal Intake
//!
//! File intake and job lifecycle control in front of a background removal
//! service. A [`JobController`] accepts one image at a time, validates it,
//! exposes a preview, hands it to a [`BackgroundRemovalService`] while
//! tracking progress, and keeps the transparent PNG result available for
//! download until the job is reset.
//!
//! ## Features
//!
//! - **Intake Validation**: PNG, JPEG and WebP up to 10MB, checked before anything else runs
//! - **Lifecycle State Machine**: Idle, Loaded, Processing, Done and Error with explicit reset
//! - **Stale Work Suppression**: progress and results of a reset job never reach its successor
//! - **Progress Mapping**: service phases mapped to percentages and human-readable labels
//! - **Result Handles**: transient `blob:` handles released on reset or drop
//! - **Pluggable Services**: in-process mock service and a remote HTTP service
//! - **CLI Integration**: optional command-line front-end (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_bgremove_intake::{IntakeConfig, JobController, JobState, RawFile};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let controller = JobController::from_config(IntakeConfig::default())?;
//!
//! let bytes = tokio::fs::read("photo.jpg").await?;
//! controller.intake(RawFile::new("photo.jpg", "image/jpeg", bytes))?;
//!
//! let info = controller.process().await?;
//! assert_eq!(controller.state(), JobState::Done);
//! println!("result available at {}", info.url);
//!
//! if let Some(path) = controller.download(None).await? {
//!     println!("saved {}", path.display());
//! }
//! controller.reset();
//! # Ok(())
//! # }
//! ```
//!
//! ## Watching Progress
//!
//! ```rust,no_run
//! use imgly_bgremove_intake::{IntakeConfig, JobController};
//!
//! # async fn example(controller: JobController) {
//! let mut updates = controller.subscribe();
//! tokio::spawn(async move {
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow_and_update().clone();
//!         println!("{} {}", snapshot.state, snapshot.status_label);
//!     }
//! });
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and progress bar
//! - `http-service` (default): Remote background removal over HTTP
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support` (default): Decode WebP sources for previews and the mock service
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! imgly-bgremove-intake = { version = "0.1", default-features = false }
//! ```

pub mod artifact;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod service;
pub mod services;
pub mod source;
#[cfg(feature = "cli")]
pub mod tracing_config;

// Public API exports
pub use artifact::{download_filename, ArtifactHandle, ArtifactInfo, HandleRegistry, ResultArtifact};
pub use backends::*;
pub use config::{IntakeConfig, IntakeConfigBuilder, ServiceConfig, DEFAULT_DOWNLOAD_PREFIX, MAX_FILE_SIZE};
pub use controller::{JobController, JobSnapshot, JobState};
pub use error::{ErrorKind, IntakeError, Result};
pub use service::{BackgroundRemovalService, ImageBlob, ProgressCallback};
pub use services::{
    progress_percent, status_label, ConsoleProgressReporter, FileIOService, NoOpProgressReporter,
    Phase, ProgressReporter, ProgressUpdate,
};
pub use source::{declared_type_for, probe_dimensions, validate, MimeType, RawFile, SourceFile, SourcePreview};

#[cfg(feature = "cli")]
pub use tracing_config::{spans, TracingConfig, TracingFormat};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_defaults() {
        let config = IntakeConfig::default();
        assert_eq!(config.max_file_size, MAX_FILE_SIZE);
        assert_eq!(config.download_prefix, DEFAULT_DOWNLOAD_PREFIX);
        assert_eq!(config.allowed_types, MimeType::ALL.to_vec());
        assert!(matches!(config.service, ServiceConfig::Mock { .. }));
    }

    #[tokio::test]
    async fn test_controller_from_default_config() {
        let controller = JobController::from_config(IntakeConfig::default()).unwrap();
        assert_eq!(controller.state(), JobState::Idle);
    }
}
