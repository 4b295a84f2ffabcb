use super::types::{ProcessingError, RasterFormat, RasterOptions};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Renders PDF pages to raster images
#[async_trait::async_trait]
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Renders the 0-based `page` of `pdf` into `output_dir` and returns the
    /// path of the written image.
    async fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        options: &RasterOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, ProcessingError>;

    /// Check if the renderer is available
    async fn health_check(&self) -> bool;
}

/// Poppler's `pdftocairo`, one process per page
pub struct PdftocairoRasterizer {
    binary: String,
}

impl PdftocairoRasterizer {
    pub fn new(binary: String) -> Self {
        Self { binary }
    }

    fn arguments(pdf: &Path, page: usize, options: &RasterOptions, output_base: &Path) -> Vec<String> {
        let page_number = (page + 1).to_string();
        let mut args = Vec::with_capacity(12);

        match options.format {
            RasterFormat::Png => args.push("-png".to_string()),
            RasterFormat::Jpeg => {
                args.push("-jpeg".to_string());
                args.push("-jpegopt".to_string());
                args.push(format!("quality={}", options.quality));
            }
        }

        args.extend([
            "-r".to_string(),
            options.dpi.to_string(),
            "-f".to_string(),
            page_number.clone(),
            "-l".to_string(),
            page_number,
            "-singlefile".to_string(),
            pdf.to_string_lossy().to_string(),
            output_base.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait::async_trait]
impl PageRasterizer for PdftocairoRasterizer {
    fn name(&self) -> &'static str {
        "pdftocairo"
    }

    async fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        options: &RasterOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, ProcessingError> {
        let output_base = output_dir.join(format!("page_{}", page + 1));

        let output = Command::new(&self.binary)
            .args(Self::arguments(pdf, page, options, &output_base))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProcessingError::Rasterize(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            tracing::error!("pdftocairo failed on page {}: {}", page + 1, err_msg);
            return Err(ProcessingError::Rasterize(format!(
                "pdftocairo failed on page {}: {}",
                page + 1,
                err_msg.trim()
            )));
        }

        // -singlefile appends the format's extension to the output base
        let rendered = output_base.with_extension(options.format.extension());
        if !tokio::fs::try_exists(&rendered).await.unwrap_or(false) {
            return Err(ProcessingError::Rasterize(format!(
                "pdftocairo produced no output for page {}",
                page + 1
            )));
        }

        Ok(rendered)
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.binary)
            .arg("-v")
            .output()
            .await
            .is_ok()
    }
}
