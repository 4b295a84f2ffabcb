use crate::config::ProcessingConfig;
use crate::services::document_processor::{
    CompressionStrategy, DocumentProcessor, GhostscriptCompression, LopdfCompression,
    PageRasterizer, PdftocairoRasterizer,
};
use crate::services::temp_storage::TempStorage;
use std::sync::Arc;
use tracing::{info, warn};

/// Selects the compression backend from configuration
pub fn create_compression(config: &ProcessingConfig) -> Arc<dyn CompressionStrategy> {
    if config.enable_ghostscript {
        Arc::new(GhostscriptCompression::new(
            config.ghostscript_path.clone(),
            config.max_pages,
        ))
    } else {
        Arc::new(LopdfCompression::new(config.max_pages))
    }
}

pub fn create_rasterizer(config: &ProcessingConfig) -> Arc<dyn PageRasterizer> {
    Arc::new(PdftocairoRasterizer::new(config.pdftocairo_path.clone()))
}

/// Wires the processor with its backends and reports their availability.
/// Missing tools are not fatal: the affected operations fail per request.
pub async fn setup_processor(
    config: &ProcessingConfig,
    storage: Arc<TempStorage>,
) -> Arc<DocumentProcessor> {
    let rasterizer = create_rasterizer(config);
    let compression = create_compression(config);

    if rasterizer.health_check().await {
        info!("🖼️  Rasterizer: {}", rasterizer.name());
    } else {
        warn!(
            "⚠️  Rasterizer '{}' not available; pdf-to-images requests will fail",
            config.pdftocairo_path
        );
    }

    if compression.health_check().await {
        info!("🗜️  Compression: {}", compression.name());
    } else {
        warn!(
            "⚠️  Compression backend '{}' not available; falling back to lopdf output",
            compression.name()
        );
    }

    Arc::new(DocumentProcessor::new(
        storage,
        rasterizer,
        compression,
        config.max_pages,
        config.raster_dpi,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_follows_flag() {
        let config = ProcessingConfig::default();
        assert_eq!(create_compression(&config).name(), "lopdf");

        let config = ProcessingConfig {
            enable_ghostscript: true,
            ..ProcessingConfig::default()
        };
        assert_eq!(create_compression(&config).name(), "ghostscript");
    }
}
