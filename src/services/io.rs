//! File I/O for sources and downloads
//!
//! Keeps filesystem access out of the controller so the lifecycle logic can be
//! exercised with in-memory files.

use crate::error::{IntakeError, Result};
use crate::source::{declared_type_for, RawFile};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Service for reading user files and writing result downloads
pub struct FileIOService;

impl FileIOService {
    /// Read a file from disk the way a browser file picker hands it over
    ///
    /// The declared type comes from the file extension, not from the content.
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    pub async fn load_raw<P: AsRef<Path>>(path: P) -> Result<RawFile> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IntakeError::file_io_error("read source file", path, &e))?;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let declared_type = declared_type_for(&name);
        tracing::debug!(
            file = %path.display(),
            declared_type = %declared_type,
            size_bytes = bytes.len(),
            "Loaded source file"
        );

        Ok(RawFile::new(name, declared_type, bytes))
    }

    /// Write download bytes to `dir/file_name`, creating `dir` if needed
    ///
    /// The file is written to a temporary name first and renamed into place.
    ///
    /// # Errors
    /// - Directory cannot be created
    /// - File cannot be written or renamed
    pub async fn write_download(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IntakeError::file_io_error("create download directory", dir, &e))?;

        let final_path = dir.join(file_name);
        let temp_path = dir.join(format!(".{}.part", file_name));

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| IntakeError::file_io_error("create download file", &temp_path, &e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| IntakeError::file_io_error("write download file", &temp_path, &e))?;
        file.flush()
            .await
            .map_err(|e| IntakeError::file_io_error("flush download file", &temp_path, &e))?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| IntakeError::file_io_error("finalize download file", &final_path, &e))?;

        tracing::info!(path = %final_path.display(), size_bytes = bytes.len(), "Download written");
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_raw_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpeg");
        tokio::fs::write(&path, b"fake jpeg").await.unwrap();

        let raw = FileIOService::load_raw(&path).await.unwrap();
        assert_eq!(raw.name(), "photo.jpeg");
        assert_eq!(raw.declared_type(), "image/jpeg");
        assert_eq!(raw.size_bytes(), 9);
    }

    #[tokio::test]
    async fn test_load_raw_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileIOService::load_raw(dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Io(_)));
    }

    #[tokio::test]
    async fn test_write_download_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out");

        let path = FileIOService::write_download(&target, "bgremoved_1.png", b"png")
            .await
            .unwrap();
        assert_eq!(path, target.join("bgremoved_1.png"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png");
        assert!(!target.join(".bgremoved_1.png.part").exists());
    }
}
