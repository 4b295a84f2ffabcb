use crate::models::{TempFile, TempJob};
use crate::services::document_processor::{CompressionLevel, PdfMode, RasterFormat};
use crate::utils::validation::FileValidationReport;
use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::error::AppError;

#[derive(Serialize, ToSchema)]
pub struct JobResponse {
    pub job_id: String,
    pub files: Vec<TempFile>,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
}

impl From<TempJob> for JobResponse {
    fn from(job: TempJob) -> Self {
        Self {
            total_size: job.total_size(),
            job_id: job.id,
            files: job.files,
            created_at: job.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    /// Saved files; empty when any part was rejected
    pub files: Vec<TempFile>,
    pub validation: Vec<FileValidationReport>,
}

#[derive(Serialize, ToSchema)]
pub struct ValidationResponse {
    pub all_valid: bool,
    pub results: Vec<FileValidationReport>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct MergeRequest {
    /// Files to merge, in output order
    #[validate(length(min = 1, max = 100, message = "Provide between 1 and 100 files"))]
    pub file_ids: Vec<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct SplitRequest {
    #[validate(length(min = 1))]
    pub file_id: String,
    /// Comma separated 1-based pages or spans, e.g. `1-3,5`
    #[validate(length(min = 1, max = 1000))]
    pub ranges: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ImagesToPdfRequest {
    #[validate(length(min = 1, max = 200, message = "Provide between 1 and 200 images"))]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub mode: PdfMode,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct PdfToImagesRequest {
    #[validate(length(min = 1))]
    pub file_id: String,
    #[validate(length(max = 1000))]
    pub pages: Option<String>,
    #[serde(default)]
    pub format: RasterFormat,
    #[validate(range(min = 36, max = 600, message = "DPI must be between 36 and 600"))]
    pub dpi: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "Quality must be between 1 and 100"))]
    pub quality: Option<u8>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct CompressRequest {
    #[validate(length(min = 1))]
    pub file_id: String,
    #[serde(default)]
    pub level: CompressionLevel,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ArchiveRequest {
    /// Files to include; every file of the job when empty
    #[serde(default)]
    #[validate(length(max = 500))]
    pub file_ids: Vec<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

/// One file part of a multipart body
pub(crate) struct UploadedPart {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Buffers every file part of a multipart body. Parts without a filename are skipped.
pub(crate) async fn collect_parts(multipart: &mut Multipart) -> Result<Vec<UploadedPart>, AppError> {
    let mut parts = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?.to_vec();
        parts.push(UploadedPart {
            name,
            content_type,
            data,
        });
    }

    if parts.is_empty() {
        return Err(AppError::BadRequest(
            "No files found in request".to_string(),
        ));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_request_requires_files() {
        let req: MergeRequest = serde_json::from_str(r#"{"file_ids":[]}"#).unwrap();
        assert!(req.validate().is_err());

        let req: MergeRequest = serde_json::from_str(r#"{"file_ids":["a","b"]}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_pdf_to_images_request_bounds() {
        let req: PdfToImagesRequest =
            serde_json::from_str(r#"{"file_id":"f","dpi":2000}"#).unwrap();
        assert!(req.validate().is_err());

        let req: PdfToImagesRequest =
            serde_json::from_str(r#"{"file_id":"f","format":"jpeg","quality":80}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.format, RasterFormat::Jpeg);
    }

    #[test]
    fn test_compress_request_defaults_to_medium() {
        let req: CompressRequest = serde_json::from_str(r#"{"file_id":"f"}"#).unwrap();
        assert_eq!(req.level, CompressionLevel::Medium);
    }

    #[test]
    fn test_split_request_rejects_blank_ranges() {
        let req: SplitRequest = serde_json::from_str(r#"{"file_id":"f","ranges":""}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
