use super::types::{ArchiveRequest, JobResponse, UploadResponse, collect_parts};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::TempFile;
use crate::utils::validation::{FileInput, ValidationRules, validate_multiple_files};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;
use validator::Validate;

#[utoipa::path(
    post,
    path = "/jobs",
    responses(
        (status = 201, description = "Job created", body = JobResponse)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let job_id = state.storage.create_job().await?;
    let job = state
        .storage
        .get_job(&job_id)
        .ok_or_else(|| AppError::Internal(format!("Job {} vanished after creation", job_id)))?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job with its files", body = JobResponse),
        (status = 404, description = "Job not found")
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = state
        .storage
        .get_job(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", job_id)))?;
    Ok(Json(job.into()))
}

#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job ID")),
    responses(
        (status = 204, description = "Job removed (or already gone)")
    ),
    tag = "jobs"
)]
pub async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> StatusCode {
    state.storage.cleanup_job(&job_id).await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/files",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body(content = String, description = "Multipart form with one or more files", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "All files saved", body = UploadResponse),
        (status = 404, description = "Job not found"),
        (status = 422, description = "At least one file was rejected; nothing was saved", body = UploadResponse)
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    if state.storage.get_job(&job_id).is_none() {
        return Err(AppError::NotFound(format!("Job not found: {}", job_id)));
    }

    let parts = collect_parts(&mut multipart).await?;
    let rules = ValidationRules::from_config(&state.config);
    let inputs: Vec<FileInput<'_>> = parts
        .iter()
        .map(|part| FileInput {
            buffer: &part.data,
            original_name: &part.name,
            declared_mime: part.content_type.as_deref(),
        })
        .collect();
    let validation = validate_multiple_files(&inputs, &rules);

    // Nothing is written unless every part passed
    if validation.iter().any(|report| !report.result.is_valid) {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(UploadResponse {
                files: Vec::new(),
                validation,
            }),
        ));
    }

    let batch: Vec<(&[u8], &str, &str)> = parts
        .iter()
        .zip(&validation)
        .map(|(part, report)| {
            let mime_type = report
                .result
                .detected_type
                .as_deref()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref());
            (part.data.as_slice(), part.name.as_str(), mime_type)
        })
        .collect();
    let saved = state.storage.save_files(&job_id, &batch).await?;

    tracing::info!(job_id = %job_id, count = saved.len(), "Uploaded files");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            files: saved,
            validation,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/jobs/{job_id}/files/{file_id}",
    params(
        ("job_id" = String, Path, description = "Job ID"),
        ("file_id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "Job or file not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path((job_id, file_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let file = state.storage.get_file(&job_id, &file_id).ok_or_else(|| {
        AppError::NotFound(format!("File {} not found in job {}", file_id, job_id))
    })?;

    let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("File {} is no longer available", file_id))
        } else {
            AppError::Internal(format!("Failed to open {}: {}", file.path.display(), e))
        }
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &file.mime_type)
        .header(header::CONTENT_LENGTH, file.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.original_name),
        )
        .body(Body::from_stream(ReaderStream::new(handle)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[utoipa::path(
    post,
    path = "/jobs/{job_id}/archive",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = ArchiveRequest,
    responses(
        (status = 201, description = "Archive created and registered", body = TempFile),
        (status = 404, description = "Job or file not found")
    ),
    tag = "files"
)]
pub async fn create_archive(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<ArchiveRequest>,
) -> Result<(StatusCode, Json<TempFile>), AppError> {
    req.validate()?;

    let files = if req.file_ids.is_empty() {
        state
            .storage
            .get_job(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", job_id)))?
            .files
    } else {
        state.storage.resolve_files(&job_id, &req.file_ids)?
    };
    if files.is_empty() {
        return Err(AppError::BadRequest("Job has no files to archive".to_string()));
    }

    let name = req.name.as_deref().unwrap_or("files.zip");
    let archive = state.storage.create_job_archive(&job_id, &files, name).await?;
    Ok((StatusCode::CREATED, Json(archive)))
}
