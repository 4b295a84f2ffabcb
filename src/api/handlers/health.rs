use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub active_jobs: usize,
    pub rasterizer: String,
    pub compression: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let rasterizer = state.processor.rasterizer();
    let rasterizer_status = if rasterizer.health_check().await {
        rasterizer.name().to_string()
    } else {
        "unavailable".to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        active_jobs: state.storage.job_count(),
        rasterizer: rasterizer_status,
        compression: state.processor.compression().name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
