#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object, Stream};
use pdf_tools_backend::services::document_processor::{
    DocumentProcessor, LopdfCompression, PageRasterizer, ProcessingError, RasterOptions,
};
use pdf_tools_backend::services::temp_storage::TempStorage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const MAX_PAGES: usize = 200;

/// Builds a PDF whose pages carry the text `{label}-{n}`
pub fn create_test_pdf(num_pages: u32, label: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..num_pages {
        let content = format!("BT /F1 12 Tf 50 300 Td ({}-{}) Tj ET", label, i + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(300),
                    Object::Integer(400),
                ]),
            ),
        ]);
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).to_string())
        .collect()
}

pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

/// Width and height of every page's MediaBox, in page order
pub fn page_sizes(bytes: &[u8]) -> Vec<(i64, i64)> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            let media_box = doc
                .get_dictionary(id)
                .unwrap()
                .get(b"MediaBox")
                .unwrap()
                .as_array()
                .unwrap()
                .clone();
            (
                media_box[2].as_i64().unwrap(),
                media_box[3].as_i64().unwrap(),
            )
        })
        .collect()
}

pub fn jpeg_image(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageOutputFormat::Jpeg(80))
        .unwrap();
    buffer.into_inner()
}

pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 30, 255]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .unwrap();
    buffer.into_inner()
}

pub async fn setup_storage() -> (TempDir, Arc<TempStorage>) {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(TempStorage::new(dir.path().join("jobs")));
    storage.init().await.unwrap();
    (dir, storage)
}

pub fn create_processor(
    storage: Arc<TempStorage>,
    rasterizer: Arc<dyn PageRasterizer>,
) -> DocumentProcessor {
    DocumentProcessor::new(
        storage,
        rasterizer,
        Arc::new(LopdfCompression::new(MAX_PAGES)),
        MAX_PAGES,
        150,
    )
}

/// Writes a small solid image per page instead of shelling out
pub struct FakeRasterizer {
    /// 0-based page that fails to render, if any
    pub fail_on: Option<usize>,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self { fail_on: None }
    }

    pub fn failing_on(page: usize) -> Self {
        Self {
            fail_on: Some(page),
        }
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn render_page(
        &self,
        _pdf: &Path,
        page: usize,
        options: &RasterOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, ProcessingError> {
        if self.fail_on == Some(page) {
            return Err(ProcessingError::Rasterize(format!(
                "page {} could not be rendered",
                page + 1
            )));
        }

        let path = output_dir.join(format!("page_{}.{}", page + 1, options.format.extension()));
        let format = match options.format.extension() {
            "png" => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };
        // Size encodes the DPI so tests can observe clamping
        let side = options.dpi / 10;
        DynamicImage::ImageRgb8(RgbImage::from_pixel(side, side, Rgb([255, 255, 255])))
            .save_with_format(&path, format)
            .map_err(|e| ProcessingError::Rasterize(e.to_string()))?;
        Ok(path)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Hand-built multipart body; each part is `(filename, content type, bytes)`
pub fn multipart_body(boundary: &str, parts: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, data) in parts {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
