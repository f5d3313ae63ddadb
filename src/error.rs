//! Error types for intake and job lifecycle operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for intake operations
pub type Result<T> = std::result::Result<T, IntakeError>;

/// Errors surfaced by the intake controller
///
/// `UnsupportedType` and `TooLarge` are raised synchronously at intake and
/// keep the job from starting. `ProcessingFailed` is raised after the
/// service attempt and leaves the job in its recoverable error state.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// Declared MIME type is not one of the accepted image types
    #[error("Unsupported file type: {mime_type}")]
    UnsupportedType { mime_type: String },

    /// File exceeds the configured size limit
    #[error("File too large: {size_bytes} bytes (limit {limit_bytes} bytes)")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    /// The background removal service failed for any reason
    #[error("Background removal failed: {0}")]
    ProcessingFailed(String),

    /// A job is currently processing and intake is disabled
    #[error("A job is already processing")]
    Busy,

    /// Operation is not allowed from the current job state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The job was reset while the service was still running
    #[error("Job {generation} was superseded before it completed")]
    Superseded { generation: u64 },

    /// Input/output errors (reading sources, writing downloads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Serializable classification of an [`IntakeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedType,
    TooLarge,
    ProcessingFailed,
    Busy,
    InvalidState,
    Superseded,
    Io,
    Config,
}

impl IntakeError {
    /// Create a new processing failure
    pub fn processing_failed<S: Into<String>>(msg: S) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
            Self::Busy => ErrorKind::Busy,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Superseded { .. } => ErrorKind::Superseded,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Generic message shown to the user in a blocking notice
    ///
    /// Service error details never reach the user; they are logged instead.
    #[must_use]
    pub fn notice(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "Only PNG, JPG and WEBP images can be uploaded.",
            Self::TooLarge { .. } => "The file must be 10MB or smaller.",
            Self::ProcessingFailed(_) => "Background removal failed. Please try again.",
            Self::Busy => "Please wait for the current image to finish.",
            Self::InvalidState(_) => "Please start over before loading another image.",
            Self::Superseded { .. } => "The previous image was discarded.",
            Self::Io(_) => "The file could not be read or written.",
            Self::Config(_) => "The configuration is invalid.",
        }
    }

    /// Whether the user must pick a different file to continue
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnsupportedType { .. } | Self::TooLarge { .. })
    }
}
