use super::types::{ValidationResponse, collect_parts};
use crate::AppState;
use crate::api::error::AppError;
use crate::utils::validation::{FileInput, ValidationRules, validate_multiple_files};
use axum::{
    Json,
    extract::{Multipart, State},
};

#[utoipa::path(
    post,
    path = "/validate",
    request_body(content = String, description = "Multipart form with one or more files", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file validation results", body = ValidationResponse),
        (status = 400, description = "No files in request")
    ),
    tag = "validation"
)]
pub async fn validate_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ValidationResponse>, AppError> {
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
    let results = validate_multiple_files(&inputs, &rules);

    Ok(Json(ValidationResponse {
        all_valid: results.iter().all(|r| r.result.is_valid),
        results,
    }))
}
