//! Configuration types for intake and job lifecycle

use crate::error::{IntakeError, Result};
use crate::source::MimeType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted source file (10 MiB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Prefix of downloaded result files, `<prefix>_<unix millis>.png`
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "bgremoved";

/// Which background removal service the controller talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceConfig {
    /// In-process service producing a transparent copy of the source
    Mock {
        /// Simulated latency per progress step, in milliseconds
        #[serde(default)]
        step_delay_ms: u64,
        /// Make every request fail
        #[serde(default)]
        fail: bool,
    },
    /// Remote service reached over HTTP
    Http {
        /// Endpoint receiving the source bytes as the POST body
        endpoint: String,
        /// Request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::Mock {
            step_delay_ms: 0,
            fail: false,
        }
    }
}

/// Configuration for the intake controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Largest accepted file in bytes
    pub max_file_size: u64,
    /// Accepted MIME types
    pub allowed_types: Vec<MimeType>,
    /// Prefix for downloaded file names
    pub download_prefix: String,
    /// Where downloads are written (None = user download directory)
    pub download_dir: Option<PathBuf>,
    /// Background removal service selection
    pub service: ServiceConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types: MimeType::ALL.to_vec(),
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
            download_dir: None,
            service: ServiceConfig::default(),
        }
    }
}

impl IntakeConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use imgly_bgremove_intake::IntakeConfig;
    ///
    /// let config = IntakeConfig::builder()
    ///     .max_file_size(5 * 1024 * 1024)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_file_size, 5 * 1024 * 1024);
    /// ```
    #[must_use]
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder::default()
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| IntakeError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&text)
    }

    /// Parse configuration from a JSON string
    ///
    /// # Errors
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| IntakeError::config(format!("Malformed config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero size limit
    /// - Empty type list
    /// - Empty download prefix or prefix containing path separators
    /// - HTTP endpoint that is not an http(s) URL, or a zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(IntakeError::config("max_file_size must be greater than 0"));
        }

        if self.allowed_types.is_empty() {
            return Err(IntakeError::config("allowed_types must not be empty"));
        }

        if self.download_prefix.is_empty()
            || self.download_prefix.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(IntakeError::config(format!(
                "Invalid download_prefix '{}'",
                self.download_prefix
            )));
        }

        if let ServiceConfig::Http {
            endpoint,
            timeout_secs,
        } = &self.service
        {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(IntakeError::config(format!(
                    "Service endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
            if *timeout_secs == 0 {
                return Err(IntakeError::config("timeout_secs must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Directory downloads go to when none is given explicitly
    #[must_use]
    pub fn resolve_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Builder for [`IntakeConfig`]
#[derive(Debug, Default)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn allowed_types(mut self, types: Vec<MimeType>) -> Self {
        self.config.allowed_types = types;
        self
    }

    #[must_use]
    pub fn download_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.download_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn download_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.download_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn service(mut self, service: ServiceConfig) -> Self {
        self.config.service = service;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// See [`IntakeConfig::validate`].
    pub fn build(self) -> Result<IntakeConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
