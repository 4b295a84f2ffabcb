use crate::models::TempFile;
use crate::services::temp_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Invalid document: {0}")]
    DocumentFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document has {pages} pages, maximum allowed is {max}")]
    TooManyPages { pages: usize, max: usize },

    #[error("Image error: {0}")]
    Image(String),

    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Processing task failed: {0}")]
    Task(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(e: image::ImageError) -> Self {
        ProcessingError::Image(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ProcessingError {
    fn from(e: tokio::task::JoinError) -> Self {
        ProcessingError::Task(e.to_string())
    }
}

impl From<std::io::Error> for ProcessingError {
    fn from(e: std::io::Error) -> Self {
        ProcessingError::Storage(StorageError::Io(e))
    }
}

/// Outcome of one document operation. Failures are reported here instead of
/// being returned as errors.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessingResult {
    pub success: bool,
    pub files: Vec<TempFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_size: Option<u64>,
}

impl ProcessingResult {
    pub fn ok(files: Vec<TempFile>) -> Self {
        Self {
            success: true,
            files,
            error: None,
            original_size: None,
            new_size: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            files: Vec::new(),
            error: Some(error.to_string()),
            original_size: None,
            new_size: None,
        }
    }

    pub fn with_sizes(mut self, original_size: u64, new_size: u64) -> Self {
        self.original_size = Some(original_size);
        self.new_size = Some(new_size);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PdfMode {
    /// One document with one page per image
    #[default]
    Single,
    /// One single-page document per image
    Multiple,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ImagesToPdfOptions {
    #[serde(default)]
    pub mode: PdfMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PdfToImagesOptions {
    /// Page selection such as `1-3,5`; all pages when absent or blank
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub format: RasterFormat,
    /// Resolution override; the configured default applies when absent
    #[serde(default)]
    pub dpi: Option<u32>,
    /// JPEG quality (1-100)
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Fully resolved rendering parameters handed to a rasterizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    pub format: RasterFormat,
    pub dpi: u32,
    pub quality: u8,
}

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_defaults() {
        let options: PdfToImagesOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.format, RasterFormat::Png);
        assert!(options.pages.is_none());

        let options: ImagesToPdfOptions = serde_json::from_str(r#"{"mode":"multiple"}"#).unwrap();
        assert_eq!(options.mode, PdfMode::Multiple);

        let level: CompressionLevel = serde_json::from_str(r#""high""#).unwrap();
        assert_eq!(level, CompressionLevel::High);
        assert!(CompressionLevel::Low < CompressionLevel::Medium);
    }

    #[test]
    fn test_failed_result_has_no_files() {
        let result = ProcessingResult::failed(ProcessingError::InvalidInput("empty".into()));
        assert!(!result.success);
        assert!(result.files.is_empty());
        assert_eq!(result.error.as_deref(), Some("Invalid input: empty"));
    }
}
