pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ProcessingConfig;
use crate::services::document_processor::DocumentProcessor;
use crate::services::temp_storage::TempStorage;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom on top of the per-file limit for multipart framing
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::validation::validate_files,
        api::handlers::jobs::create_job,
        api::handlers::jobs::get_job,
        api::handlers::jobs::delete_job,
        api::handlers::jobs::upload_files,
        api::handlers::jobs::download_file,
        api::handlers::jobs::create_archive,
        api::handlers::processing::merge,
        api::handlers::processing::split,
        api::handlers::processing::images_to_pdf,
        api::handlers::processing::pdf_to_images,
        api::handlers::processing::compress,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::types::JobResponse,
            api::handlers::types::UploadResponse,
            api::handlers::types::ValidationResponse,
            api::handlers::types::MergeRequest,
            api::handlers::types::SplitRequest,
            api::handlers::types::ImagesToPdfRequest,
            api::handlers::types::PdfToImagesRequest,
            api::handlers::types::CompressRequest,
            api::handlers::types::ArchiveRequest,
            models::TempFile,
            services::document_processor::ProcessingResult,
            services::document_processor::PdfMode,
            services::document_processor::RasterFormat,
            services::document_processor::CompressionLevel,
            utils::validation::ValidationResult,
            utils::validation::FileValidationReport,
        )
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "validation", description = "Upload validation without storage"),
        (name = "jobs", description = "Job lifecycle"),
        (name = "files", description = "Job files and archives"),
        (name = "processing", description = "Document transformations")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<TempStorage>,
    pub processor: Arc<DocumentProcessor>,
    pub config: Arc<ProcessingConfig>,
}

impl AppState {
    pub fn new(
        config: ProcessingConfig,
        storage: Arc<TempStorage>,
        processor: Arc<DocumentProcessor>,
    ) -> Self {
        Self {
            storage,
            processor,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    use api::handlers::{health, jobs, processing, validation};

    let body_limit = state
        .config
        .max_file_size_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    let routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/validate", post(validation::validate_files))
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/:job_id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:job_id/files", post(jobs::upload_files))
        .route("/jobs/:job_id/files/:file_id", get(jobs::download_file))
        .route("/jobs/:job_id/archive", post(jobs::create_archive))
        .route("/jobs/:job_id/merge", post(processing::merge))
        .route("/jobs/:job_id/split", post(processing::split))
        .route("/jobs/:job_id/images-to-pdf", post(processing::images_to_pdf))
        .route("/jobs/:job_id/pdf-to-images", post(processing::pdf_to_images))
        .route("/jobs/:job_id/compress", post(processing::compress))
        .layer(DefaultBodyLimit::max(body_limit));

    api::middleware::rate_limit::with_rate_limit(routes, &state.config)
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
