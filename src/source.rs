//! Source files: declared MIME types, validation and local previews

use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Image types accepted at intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    WebP,
}

impl MimeType {
    /// All accepted types, in the order they are listed to users
    pub const ALL: [MimeType; 3] = [MimeType::Png, MimeType::Jpeg, MimeType::WebP];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Parse a declared MIME type
    ///
    /// Matching is exact: no trimming, no case folding, no aliases such as
    /// `image/jpg`.
    #[must_use]
    pub fn parse(declared: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mime| mime.as_str() == declared)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file as handed over by the user, before validation
///
/// Mirrors a browser `File`: a name, the MIME type the platform declared for
/// it, and its contents. The size is always the length of the contents.
#[derive(Debug, Clone)]
pub struct RawFile {
    name: String,
    declared_type: String,
    bytes: Arc<[u8]>,
}

impl RawFile {
    pub fn new<N, T, B>(name: N, declared_type: T, bytes: B) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        B: Into<Vec<u8>>,
    {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// MIME type a platform would declare for a file name, based on its extension
///
/// Unknown extensions map to `application/octet-stream`.
#[must_use]
pub fn declared_type_for(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| image::ImageFormat::from_extension(ext))
        .map_or_else(
            || "application/octet-stream".to_string(),
            |format| format.to_mime_type().to_string(),
        )
}

/// A validated source image, ready to be processed
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime_type: MimeType,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// Validate a raw file against the intake limits
///
/// The type is checked before the size.
///
/// # Errors
/// - `UnsupportedType` if the declared type is not allowed
/// - `TooLarge` if the file exceeds `config.max_file_size`
pub fn validate(raw: &RawFile, config: &IntakeConfig) -> Result<SourceFile> {
    let mime_type = MimeType::parse(raw.declared_type())
        .filter(|mime| config.allowed_types.contains(mime))
        .ok_or_else(|| IntakeError::UnsupportedType {
            mime_type: raw.declared_type().to_string(),
        })?;

    if raw.size_bytes() > config.max_file_size {
        return Err(IntakeError::TooLarge {
            size_bytes: raw.size_bytes(),
            limit_bytes: config.max_file_size,
        });
    }

    Ok(SourceFile {
        name: raw.name.clone(),
        mime_type,
        bytes: Arc::clone(&raw.bytes),
    })
}

/// Local rendering of a source image, shown while the job runs
///
/// Starts out empty at intake and is filled in by a background render. The
/// data URL is shared, so snapshots of the job never copy it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourcePreview {
    /// `data:` URL with the base64 encoded source, once rendered
    pub data_url: Option<Arc<str>>,
    /// Pixel dimensions, when the header could be read
    pub dimensions: Option<(u32, u32)>,
}

impl SourcePreview {
    /// Preview of a source whose render has not finished yet
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Encode the data URL and probe the dimensions of a source
    ///
    /// Runs in time proportional to the file size; call it off the async
    /// executor.
    #[must_use]
    pub fn render(source: &SourceFile) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(source.bytes());
        Self {
            data_url: Some(Arc::from(format!("data:{};base64,{}", source.mime_type(), encoded))),
            dimensions: probe_dimensions(source.bytes()),
        }
    }

    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.data_url.is_some()
    }
}

/// Read the pixel dimensions from an image header without decoding pixels
///
/// Returns `None` when the format cannot be recognized or its decoder is not
/// compiled in.
#[must_use]
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            tracing::debug!(error = %e, "Could not probe source dimensions");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::new(width, height);
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_mime_parse() {
        assert_eq!(MimeType::parse("image/png"), Some(MimeType::Png));
        assert_eq!(MimeType::parse("image/jpeg"), Some(MimeType::Jpeg));
        assert_eq!(MimeType::parse("image/webp"), Some(MimeType::WebP));
        assert_eq!(MimeType::parse("image/jpg"), None);
        assert_eq!(MimeType::parse(" image/jpeg"), None);
        assert_eq!(MimeType::parse("IMAGE/PNG"), None);
        assert_eq!(MimeType::parse("image/gif"), None);
        assert_eq!(MimeType::parse(""), None);
    }

    #[test]
    fn test_declared_type_for() {
        assert_eq!(declared_type_for("cat.png"), "image/png");
        assert_eq!(declared_type_for("cat.JPG"), "image/jpeg");
        assert_eq!(declared_type_for("cat.webp"), "image/webp");
        assert_eq!(declared_type_for("cat.gif"), "image/gif");
        assert_eq!(declared_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn test_validate_accepts_allowed_types() {
        let config = IntakeConfig::default();
        for mime in MimeType::ALL {
            let raw = RawFile::new("a", mime.as_str(), vec![0u8; 16]);
            let source = validate(&raw, &config).unwrap();
            assert_eq!(source.mime_type(), mime);
            assert_eq!(source.size_bytes(), 16);
        }
    }

    #[test]
    fn test_validate_rejects_gif() {
        let raw = RawFile::new("a.gif", "image/gif", vec![0u8; 1024]);
        let err = validate(&raw, &IntakeConfig::default()).unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedType { ref mime_type } if mime_type == "image/gif"));
    }

    #[test]
    fn test_validate_size_boundary() {
        let config = IntakeConfig::builder().max_file_size(64).build().unwrap();

        let exact = RawFile::new("a", "image/png", vec![0u8; 64]);
        assert!(validate(&exact, &config).is_ok());

        let over = RawFile::new("a", "image/png", vec![0u8; 65]);
        let err = validate(&over, &config).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::TooLarge {
                size_bytes: 65,
                limit_bytes: 64
            }
        ));
    }

    #[test]
    fn test_validate_checks_type_before_size() {
        let config = IntakeConfig::builder().max_file_size(4).build().unwrap();
        let raw = RawFile::new("a.gif", "image/gif", vec![0u8; 8]);
        assert!(matches!(
            validate(&raw, &config),
            Err(IntakeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_validate_respects_configured_types() {
        let config = IntakeConfig::builder()
            .allowed_types(vec![MimeType::Png])
            .build()
            .unwrap();
        let raw = RawFile::new("a.jpg", "image/jpeg", vec![0u8; 8]);
        assert!(matches!(
            validate(&raw, &config),
            Err(IntakeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_preview_render() {
        let raw = RawFile::new("a.png", "image/png", vec![1u8, 2, 3]);
        let source = validate(&raw, &IntakeConfig::default()).unwrap();
        assert!(!SourcePreview::pending().is_rendered());

        let preview = SourcePreview::render(&source);
        assert!(preview.is_rendered());
        assert_eq!(preview.data_url.as_deref(), Some("data:image/png;base64,AQID"));
        assert_eq!(preview.dimensions, None);

        let raw = RawFile::new("b.png", "image/png", png_bytes(5, 2));
        let source = validate(&raw, &IntakeConfig::default()).unwrap();
        assert_eq!(SourcePreview::render(&source).dimensions, Some((5, 2)));
    }

    #[test]
    fn test_validate_rejects_non_canonical_type() {
        let raw = RawFile::new("a.jpg", " IMAGE/JPEG ", vec![0u8; 8]);
        assert!(matches!(
            validate(&raw, &IntakeConfig::default()),
            Err(IntakeError::UnsupportedType { ref mime_type }) if mime_type == " IMAGE/JPEG "
        ));
    }

    #[test]
    fn test_probe_dimensions() {
        assert_eq!(probe_dimensions(&png_bytes(7, 3)), Some((7, 3)));
        assert_eq!(probe_dimensions(b"not an image"), None);
    }
}
