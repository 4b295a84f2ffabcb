use super::types::{
    CompressRequest, ImagesToPdfRequest, MergeRequest, PdfToImagesRequest, SplitRequest,
};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::TempFile;
use crate::services::document_processor::{
    ImagesToPdfOptions, PdfToImagesOptions, ProcessingResult,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::time::Duration;
use validator::Validate;

/// Runs one operation under a deadline. An expired job is discarded entirely.
async fn run_with_deadline<F>(
    state: &AppState,
    job_id: &str,
    deadline: Duration,
    operation: F,
) -> Result<Response, AppError>
where
    F: Future<Output = ProcessingResult>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => {
            let status = if result.success {
                StatusCode::OK
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            Ok((status, Json(result)).into_response())
        }
        Err(_) => {
            tracing::warn!(
                job_id = %job_id,
                "⏱️  Processing exceeded {:?}, discarding job",
                deadline
            );
            state.storage.cleanup_job(job_id).await;
            Err(AppError::Timeout(format!(
                "Processing did not finish within {} ms; job {} was discarded",
                deadline.as_millis(),
                job_id
            )))
        }
    }
}

fn resolve_one(state: &AppState, job_id: &str, file_id: &str) -> Result<TempFile, AppError> {
    state.storage.get_file(job_id, file_id).ok_or_else(|| {
        AppError::NotFound(format!("File {} not found in job {}", file_id, job_id))
    })
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/merge",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = MergeRequest,
    responses(
        (status = 200, description = "Merged document", body = ProcessingResult),
        (status = 404, description = "Job or file not found"),
        (status = 408, description = "Timed out; job discarded"),
        (status = 422, description = "Processing failed", body = ProcessingResult)
    ),
    tag = "processing"
)]
pub async fn merge(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<MergeRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let files = state.storage.resolve_files(&job_id, &req.file_ids)?;

    run_with_deadline(
        &state,
        &job_id,
        state.config.job_timeout(),
        state.processor.merge_pdfs(&job_id, &files),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/split",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = SplitRequest,
    responses(
        (status = 200, description = "One document per range", body = ProcessingResult),
        (status = 404, description = "Job or file not found"),
        (status = 408, description = "Timed out; job discarded"),
        (status = 422, description = "Processing failed", body = ProcessingResult)
    ),
    tag = "processing"
)]
pub async fn split(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<SplitRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let file = resolve_one(&state, &job_id, &req.file_id)?;

    run_with_deadline(
        &state,
        &job_id,
        state.config.job_timeout(),
        state.processor.split_pdf(&job_id, &file, &req.ranges),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/images-to-pdf",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = ImagesToPdfRequest,
    responses(
        (status = 200, description = "Generated document(s)", body = ProcessingResult),
        (status = 404, description = "Job or file not found"),
        (status = 408, description = "Timed out; job discarded"),
        (status = 422, description = "Processing failed", body = ProcessingResult)
    ),
    tag = "processing"
)]
pub async fn images_to_pdf(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<ImagesToPdfRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let files = state.storage.resolve_files(&job_id, &req.file_ids)?;
    let options = ImagesToPdfOptions { mode: req.mode };

    run_with_deadline(
        &state,
        &job_id,
        state.config.job_timeout(),
        state.processor.images_to_pdf(&job_id, &files, &options),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/pdf-to-images",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = PdfToImagesRequest,
    responses(
        (status = 200, description = "One image per selected page", body = ProcessingResult),
        (status = 404, description = "Job or file not found"),
        (status = 408, description = "Timed out; job discarded"),
        (status = 422, description = "Processing failed", body = ProcessingResult)
    ),
    tag = "processing"
)]
pub async fn pdf_to_images(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<PdfToImagesRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let file = resolve_one(&state, &job_id, &req.file_id)?;
    let options = PdfToImagesOptions {
        pages: req.pages,
        format: req.format,
        dpi: req.dpi,
        quality: req.quality,
    };

    run_with_deadline(
        &state,
        &job_id,
        state.config.job_timeout(),
        state.processor.pdf_to_images(&job_id, &file, &options),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/compress",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = CompressRequest,
    responses(
        (status = 200, description = "Compressed document", body = ProcessingResult),
        (status = 404, description = "Job or file not found"),
        (status = 408, description = "Timed out; job discarded"),
        (status = 422, description = "Processing failed", body = ProcessingResult)
    ),
    tag = "processing"
)]
pub async fn compress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<CompressRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    let file = resolve_one(&state, &job_id, &req.file_id)?;

    run_with_deadline(
        &state,
        &job_id,
        state.config.compress_timeout(),
        state.processor.compress_pdf(&job_id, &file, req.level),
    )
    .await
}
