//! Document transformations over job-scoped temp files.
//!
//! Each operation reads its inputs from [`TempStorage`], runs the CPU-bound PDF
//! work on the blocking pool and writes its outputs back into the same job.
//! Failures never escape as errors: they are folded into a [`ProcessingResult`]
//! and no output of a failed run stays registered.

pub mod compress;
mod document;
mod images;
mod merge;
pub mod rasterize;
mod split;
pub mod types;

pub use compress::{CompressionStrategy, GhostscriptCompression, LopdfCompression};
pub use rasterize::{PageRasterizer, PdftocairoRasterizer};
pub use types::{
    CompressionLevel, DEFAULT_JPEG_QUALITY, ImagesToPdfOptions, PdfMode, PdfToImagesOptions,
    ProcessingError, ProcessingResult, RasterFormat, RasterOptions,
};

use crate::models::TempFile;
use crate::services::temp_storage::TempStorage;
use crate::utils::page_range::{all_pages, parse_page_selection};
use document::{load_document, output_stem};
use std::sync::Arc;
use std::time::Instant;

const PDF_MIME: &str = "application/pdf";
const IMAGE_MIMES: [&str; 2] = ["image/jpeg", "image/png"];

const MIN_DPI: u32 = 36;
const MAX_DPI: u32 = 600;

/// A produced file waiting to be registered
struct Output {
    name: String,
    bytes: Vec<u8>,
    mime_type: &'static str,
}

pub struct DocumentProcessor {
    storage: Arc<TempStorage>,
    rasterizer: Arc<dyn PageRasterizer>,
    compression: Arc<dyn CompressionStrategy>,
    max_pages: usize,
    default_dpi: u32,
}

impl DocumentProcessor {
    pub fn new(
        storage: Arc<TempStorage>,
        rasterizer: Arc<dyn PageRasterizer>,
        compression: Arc<dyn CompressionStrategy>,
        max_pages: usize,
        default_dpi: u32,
    ) -> Self {
        Self {
            storage,
            rasterizer,
            compression,
            max_pages,
            default_dpi,
        }
    }

    pub fn storage(&self) -> &Arc<TempStorage> {
        &self.storage
    }

    pub fn rasterizer(&self) -> &dyn PageRasterizer {
        self.rasterizer.as_ref()
    }

    pub fn compression(&self) -> &dyn CompressionStrategy {
        self.compression.as_ref()
    }

    /// Concatenates the pages of every input, in input order
    pub async fn merge_pdfs(&self, job_id: &str, files: &[TempFile]) -> ProcessingResult {
        let started = Instant::now();
        finish("merge", job_id, started, self.try_merge(job_id, files).await)
    }

    /// One output document per page group of `range_spec`
    pub async fn split_pdf(&self, job_id: &str, file: &TempFile, range_spec: &str) -> ProcessingResult {
        let started = Instant::now();
        finish("split", job_id, started, self.try_split(job_id, file, range_spec).await)
    }

    pub async fn images_to_pdf(
        &self,
        job_id: &str,
        files: &[TempFile],
        options: &ImagesToPdfOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        finish(
            "images_to_pdf",
            job_id,
            started,
            self.try_images_to_pdf(job_id, files, options).await,
        )
    }

    pub async fn pdf_to_images(
        &self,
        job_id: &str,
        file: &TempFile,
        options: &PdfToImagesOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        finish(
            "pdf_to_images",
            job_id,
            started,
            self.try_pdf_to_images(job_id, file, options).await,
        )
    }

    pub async fn compress_pdf(
        &self,
        job_id: &str,
        file: &TempFile,
        level: CompressionLevel,
    ) -> ProcessingResult {
        let started = Instant::now();
        finish(
            "compress",
            job_id,
            started,
            self.try_compress(job_id, file, level).await,
        )
    }

    async fn try_merge(
        &self,
        job_id: &str,
        files: &[TempFile],
    ) -> Result<ProcessingResult, ProcessingError> {
        if files.is_empty() {
            return Err(ProcessingError::InvalidInput("No files to merge".into()));
        }
        let files = self.owned_files(job_id, files)?;
        ensure_mime(&files, &[PDF_MIME])?;

        let mut inputs = Vec::with_capacity(files.len());
        let mut original_size = 0;
        for file in &files {
            let bytes = self.storage.read_file(&file.path).await?;
            original_size += bytes.len() as u64;
            inputs.push(bytes);
        }

        let max_pages = self.max_pages;
        let merged =
            tokio::task::spawn_blocking(move || merge::merge_documents(&inputs, max_pages))
                .await??;
        let new_size = merged.len() as u64;

        let saved = self
            .save_outputs(
                job_id,
                vec![Output {
                    name: "merged.pdf".to_string(),
                    bytes: merged,
                    mime_type: PDF_MIME,
                }],
            )
            .await?;

        Ok(ProcessingResult::ok(saved).with_sizes(original_size, new_size))
    }

    async fn try_split(
        &self,
        job_id: &str,
        file: &TempFile,
        range_spec: &str,
    ) -> Result<ProcessingResult, ProcessingError> {
        let file = self.owned_file(job_id, file)?;
        ensure_mime(std::slice::from_ref(&file), &[PDF_MIME])?;

        let bytes = self.storage.read_file(&file.path).await?;
        let original_size = bytes.len() as u64;
        let max_pages = self.max_pages;
        let spec = range_spec.to_string();
        let parts =
            tokio::task::spawn_blocking(move || split::split_document(&bytes, &spec, max_pages))
                .await??;

        let stem = output_stem(&file.original_name);
        let outputs: Vec<Output> = parts
            .into_iter()
            .map(|part| Output {
                name: format!("{}_pages_{}.pdf", stem, part.label),
                bytes: part.bytes,
                mime_type: PDF_MIME,
            })
            .collect();
        let new_size = outputs.iter().map(|o| o.bytes.len() as u64).sum();

        let saved = self.save_outputs(job_id, outputs).await?;
        Ok(ProcessingResult::ok(saved).with_sizes(original_size, new_size))
    }

    async fn try_images_to_pdf(
        &self,
        job_id: &str,
        files: &[TempFile],
        options: &ImagesToPdfOptions,
    ) -> Result<ProcessingResult, ProcessingError> {
        if files.is_empty() {
            return Err(ProcessingError::InvalidInput("No images to convert".into()));
        }
        let files = self.owned_files(job_id, files)?;
        ensure_mime(&files, &IMAGE_MIMES)?;
        if options.mode == PdfMode::Single && files.len() > self.max_pages {
            return Err(ProcessingError::TooManyPages {
                pages: files.len(),
                max: self.max_pages,
            });
        }

        let mut inputs = Vec::with_capacity(files.len());
        let mut original_size = 0;
        for file in &files {
            let bytes = self.storage.read_file(&file.path).await?;
            original_size += bytes.len() as u64;
            inputs.push((output_stem(&file.original_name), file.mime_type.clone(), bytes));
        }

        let mode = options.mode;
        let outputs = tokio::task::spawn_blocking(move || -> Result<Vec<Output>, ProcessingError> {
            let mut embedded = Vec::with_capacity(inputs.len());
            for (stem, mime_type, bytes) in inputs {
                embedded.push((stem, images::embed_image(&bytes, &mime_type)?));
            }

            match mode {
                PdfMode::Single => {
                    let pages = embedded.into_iter().map(|(_, image)| image).collect();
                    Ok(vec![Output {
                        name: "images.pdf".to_string(),
                        bytes: images::build_image_document(pages)?,
                        mime_type: PDF_MIME,
                    }])
                }
                PdfMode::Multiple => embedded
                    .into_iter()
                    .map(|(stem, image)| {
                        Ok(Output {
                            name: format!("{}.pdf", stem),
                            bytes: images::build_image_document(vec![image])?,
                            mime_type: PDF_MIME,
                        })
                    })
                    .collect(),
            }
        })
        .await??;
        let new_size = outputs.iter().map(|o| o.bytes.len() as u64).sum();

        let saved = self.save_outputs(job_id, outputs).await?;
        Ok(ProcessingResult::ok(saved).with_sizes(original_size, new_size))
    }

    async fn try_pdf_to_images(
        &self,
        job_id: &str,
        file: &TempFile,
        options: &PdfToImagesOptions,
    ) -> Result<ProcessingResult, ProcessingError> {
        let file = self.owned_file(job_id, file)?;
        ensure_mime(std::slice::from_ref(&file), &[PDF_MIME])?;

        let bytes = self.storage.read_file(&file.path).await?;
        let original_size = bytes.len() as u64;
        let max_pages = self.max_pages;
        let page_count = tokio::task::spawn_blocking(move || {
            load_document(&bytes, max_pages).map(|doc| doc.get_pages().len())
        })
        .await??;

        let pages = match options.pages.as_deref().map(str::trim) {
            Some(spec) if !spec.is_empty() => parse_page_selection(spec, page_count),
            _ => all_pages(page_count),
        };
        if pages.is_empty() {
            return Err(ProcessingError::InvalidInput(format!(
                "Page selection selects no pages (document has {} pages)",
                page_count
            )));
        }

        let raster = RasterOptions {
            format: options.format,
            dpi: options.dpi.unwrap_or(self.default_dpi).clamp(MIN_DPI, MAX_DPI),
            quality: options.quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100),
        };

        // Rendered pages stay outside the job until every page succeeded
        let staging = tempfile::Builder::new().prefix("pdf-raster-").tempdir()?;
        let stem = output_stem(&file.original_name);
        let mut outputs = Vec::with_capacity(pages.len());
        for page in pages {
            let rendered = self
                .rasterizer
                .render_page(&file.path, page, &raster, staging.path())
                .await?;
            outputs.push(Output {
                name: format!("{}_page_{}.{}", stem, page + 1, raster.format.extension()),
                bytes: tokio::fs::read(&rendered).await?,
                mime_type: raster.format.mime_type(),
            });
        }
        let new_size = outputs.iter().map(|o| o.bytes.len() as u64).sum();

        let saved = self.save_outputs(job_id, outputs).await?;
        Ok(ProcessingResult::ok(saved).with_sizes(original_size, new_size))
    }

    async fn try_compress(
        &self,
        job_id: &str,
        file: &TempFile,
        level: CompressionLevel,
    ) -> Result<ProcessingResult, ProcessingError> {
        let file = self.owned_file(job_id, file)?;
        ensure_mime(std::slice::from_ref(&file), &[PDF_MIME])?;

        let original = self.storage.read_file(&file.path).await?;
        let original_size = original.len() as u64;

        let compressed = self.compression.compress(&file.path, level).await?;
        tracing::debug!(
            strategy = self.compression.name(),
            ?level,
            "Compressed {} -> {} bytes",
            original_size,
            compressed.len()
        );

        // Never hand back something larger than the input
        let bytes = if (compressed.len() as u64) < original_size {
            compressed
        } else {
            original
        };
        let new_size = bytes.len() as u64;

        let saved = self
            .save_outputs(
                job_id,
                vec![Output {
                    name: format!("{}_compressed.pdf", output_stem(&file.original_name)),
                    bytes,
                    mime_type: PDF_MIME,
                }],
            )
            .await?;

        Ok(ProcessingResult::ok(saved).with_sizes(original_size, new_size))
    }

    /// Re-reads input records from the registry so paths come from the job itself
    fn owned_files(&self, job_id: &str, files: &[TempFile]) -> Result<Vec<TempFile>, ProcessingError> {
        let ids: Vec<String> = files.iter().map(|f| f.id.clone()).collect();
        Ok(self.storage.resolve_files(job_id, &ids)?)
    }

    fn owned_file(&self, job_id: &str, file: &TempFile) -> Result<TempFile, ProcessingError> {
        let mut files = self.owned_files(job_id, std::slice::from_ref(file))?;
        files
            .pop()
            .ok_or_else(|| ProcessingError::InvalidInput("No input file".into()))
    }

    /// Registers outputs; on the first failure the ones already saved are removed
    async fn save_outputs(
        &self,
        job_id: &str,
        outputs: Vec<Output>,
    ) -> Result<Vec<TempFile>, ProcessingError> {
        let batch: Vec<(&[u8], &str, &str)> = outputs
            .iter()
            .map(|o| (o.bytes.as_slice(), o.name.as_str(), o.mime_type))
            .collect();
        Ok(self.storage.save_files(job_id, &batch).await?)
    }
}

fn ensure_mime(files: &[TempFile], accepted: &[&str]) -> Result<(), ProcessingError> {
    match files
        .iter()
        .find(|f| !accepted.contains(&f.mime_type.as_str()))
    {
        Some(file) => Err(ProcessingError::InvalidInput(format!(
            "'{}' has unsupported type {}",
            file.original_name, file.mime_type
        ))),
        None => Ok(()),
    }
}

fn finish(
    operation: &str,
    job_id: &str,
    started: Instant,
    result: Result<ProcessingResult, ProcessingError>,
) -> ProcessingResult {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(result) => {
            tracing::info!(
                job_id = %job_id,
                outputs = result.files.len(),
                elapsed_ms,
                "✅ {} completed",
                operation
            );
            result
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, elapsed_ms, "{} failed: {}", operation, e);
            ProcessingResult::failed(e)
        }
    }
}
