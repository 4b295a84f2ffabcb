use super::document::{load_document, save_document_with};
use super::types::{CompressionLevel, ProcessingError};
use lopdf::{Document, Object, SaveOptions};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Re-serializes a PDF more compactly. The level selects how aggressive the
/// strategy is allowed to be.
#[async_trait::async_trait]
pub trait CompressionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compress(&self, input: &Path, level: CompressionLevel)
    -> Result<Vec<u8>, ProcessingError>;

    /// Check if the backing tool is available
    async fn health_check(&self) -> bool;
}

/// Pure-Rust strategy on top of lopdf, always available
pub struct LopdfCompression {
    max_pages: usize,
}

impl LopdfCompression {
    pub fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }
}

#[async_trait::async_trait]
impl CompressionStrategy for LopdfCompression {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    async fn compress(
        &self,
        input: &Path,
        level: CompressionLevel,
    ) -> Result<Vec<u8>, ProcessingError> {
        let bytes = tokio::fs::read(input).await?;
        let max_pages = self.max_pages;
        tokio::task::spawn_blocking(move || compress_document(&bytes, level, max_pages)).await?
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub(crate) fn compress_document(
    bytes: &[u8],
    level: CompressionLevel,
    max_pages: usize,
) -> Result<Vec<u8>, ProcessingError> {
    let mut doc = load_document(bytes, max_pages)?;

    if level >= CompressionLevel::Medium {
        doc.prune_objects();
        doc.delete_zero_length_streams();
    }

    if level == CompressionLevel::High {
        strip_metadata(&mut doc);
        doc.prune_objects();
        doc.renumber_objects();
    }

    // Object streams need a 1.5 header
    if doc.version.as_str() < "1.5" {
        doc.version = "1.5".to_string();
    }
    doc.compress();

    let options = SaveOptions::builder()
        .use_object_streams(true)
        .use_xref_streams(true)
        .build();
    save_document_with(&mut doc, options)
}

/// Drops the Info dictionary and the catalog's XMP stream
fn strip_metadata(doc: &mut Document) {
    doc.trailer.remove(b"Info");

    let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) else {
        return;
    };
    if let Ok(catalog) = doc.get_object_mut(root_id).and_then(Object::as_dict_mut) {
        catalog.remove(b"Metadata");
    }
}

/// Ghostscript `pdfwrite` re-distillation with a lopdf fallback
pub struct GhostscriptCompression {
    binary: String,
    fallback: LopdfCompression,
}

impl GhostscriptCompression {
    pub fn new(binary: String, max_pages: usize) -> Self {
        Self {
            binary,
            fallback: LopdfCompression::new(max_pages),
        }
    }

    fn pdf_settings(level: CompressionLevel) -> &'static str {
        match level {
            CompressionLevel::Low => "/printer",
            CompressionLevel::Medium => "/ebook",
            CompressionLevel::High => "/screen",
        }
    }

    async fn distill(
        &self,
        input: &Path,
        level: CompressionLevel,
    ) -> Result<Vec<u8>, ProcessingError> {
        let staging = tempfile::Builder::new().prefix("pdf-gs-").tempdir()?;
        let output: PathBuf = staging.path().join("out.pdf");

        let result = Command::new(&self.binary)
            .arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.5")
            .arg(format!("-dPDFSETTINGS={}", Self::pdf_settings(level)))
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dBATCH")
            .arg("-dSAFER")
            .arg(format!("-sOutputFile={}", output.display()))
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProcessingError::Compression(format!("Failed to run {}: {}", self.binary, e)))?;

        if !result.status.success() {
            let err_msg = String::from_utf8_lossy(&result.stderr);
            return Err(ProcessingError::Compression(format!(
                "Ghostscript failed: {}",
                err_msg.trim()
            )));
        }

        Ok(tokio::fs::read(&output).await?)
    }
}

#[async_trait::async_trait]
impl CompressionStrategy for GhostscriptCompression {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    async fn compress(
        &self,
        input: &Path,
        level: CompressionLevel,
    ) -> Result<Vec<u8>, ProcessingError> {
        let baseline = self.fallback.compress(input, level).await?;

        match self.distill(input, level).await {
            Ok(distilled) if distilled.len() < baseline.len() => Ok(distilled),
            Ok(distilled) => {
                tracing::debug!(
                    "Ghostscript output ({} bytes) not smaller than lopdf ({} bytes)",
                    distilled.len(),
                    baseline.len()
                );
                Ok(baseline)
            }
            Err(e) => {
                tracing::warn!("{}; using lopdf result", e);
                Ok(baseline)
            }
        }
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
