use clap::Parser;
use dotenvy::dotenv;
use pdf_tools_backend::api::middleware::request_id::REQUEST_ID_HEADER;
use pdf_tools_backend::config::ProcessingConfig;
use pdf_tools_backend::infrastructure::{processing, storage};
use pdf_tools_backend::services::worker::BackgroundWorker;
use pdf_tools_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Base directory for job storage (overrides TEMP_DIR)
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_tools_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting PDF Tools Backend...");

    let mut config = ProcessingConfig::from_env();
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }
    info!(
        "🛡️  Limits: Max Size={}MB, Max Pages={}, Timeout={}ms, Compress Timeout={}ms, Ghostscript={}",
        config.max_file_size_mb,
        config.max_pages,
        config.job_timeout_ms,
        config.compress_timeout_ms,
        config.enable_ghostscript
    );

    // 2. Infrastructure
    let storage = storage::setup_storage(&config).await?;
    let processor = processing::setup_processor(&config, storage.clone()).await;

    // 3. Background sweep
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(
        storage.clone(),
        config.cleanup_interval(),
        config.temp_max_age_hours,
        shutdown_rx,
    );
    let worker_handle = tokio::spawn(worker.run());
    info!("👷 Cleanup worker initialized.");

    // 4. API
    let state = AppState::new(config, storage.clone(), processor);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 5. Shutdown
    info!("🛑 Shutting down backend services...");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    let removed = storage.cleanup_all_jobs().await;
    info!("👋 Backend exited cleanly ({} jobs removed).", removed);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
