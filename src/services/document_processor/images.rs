//! Image to PDF conversion.
//!
//! JPEG data is embedded as-is behind a `DCTDecode` filter when its component
//! count maps onto a PDF colour space; everything else is decoded and stored as
//! flate-compressed 8-bit samples, with alpha carried in a soft mask.

use super::document::{install_page_tree, save_document};
use super::types::ProcessingError;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};

/// An image XObject ready to be placed on its own page
pub(crate) struct PageImage {
    pub width: u32,
    pub height: u32,
    image: Stream,
    smask: Option<Stream>,
}

/// Embeds one image, choosing the embedder from its MIME type
pub(crate) fn embed_image(bytes: &[u8], mime_type: &str) -> Result<PageImage, ProcessingError> {
    match mime_type {
        "image/jpeg" => embed_jpeg(bytes),
        "image/png" => embed_decoded(&image::load_from_memory_with_format(
            bytes,
            ImageFormat::Png,
        )?),
        other => Err(ProcessingError::InvalidInput(format!(
            "Unsupported image type '{}'",
            other
        ))),
    }
}

fn embed_jpeg(bytes: &[u8]) -> Result<PageImage, ProcessingError> {
    let decoder = JpegDecoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions();

    let color_space: &[u8] = match (decoder.color_type(), jpeg_components(bytes)) {
        (ColorType::L8, Some(1)) => b"DeviceGray",
        (ColorType::Rgb8, Some(3)) => b"DeviceRGB",
        // CMYK and other layouts are normalised through a full decode
        _ => {
            return embed_decoded(&image::load_from_memory_with_format(
                bytes,
                ImageFormat::Jpeg,
            )?);
        }
    };

    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"DCTDecode".to_vec())),
    ]);

    Ok(PageImage {
        width,
        height,
        image: Stream::new(dict, bytes.to_vec()).with_compression(false),
        smask: None,
    })
}

fn embed_decoded(img: &DynamicImage) -> Result<PageImage, ProcessingError> {
    let (width, height) = img.dimensions();
    let color = img.color();

    let smask = if color.has_alpha() {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        Some(flate_image(width, height, b"DeviceGray", &alpha)?)
    } else {
        None
    };

    let image = if color.has_color() {
        flate_image(width, height, b"DeviceRGB", &img.to_rgb8().into_raw())?
    } else {
        flate_image(width, height, b"DeviceGray", &img.to_luma8().into_raw())?
    };

    Ok(PageImage {
        width,
        height,
        image,
        smask,
    })
}

fn flate_image(
    width: u32,
    height: u32,
    color_space: &[u8],
    samples: &[u8],
) -> Result<Stream, ProcessingError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(samples)?;
    let data = encoder.finish()?;

    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"FlateDecode".to_vec())),
    ]);
    Ok(Stream::new(dict, data).with_compression(false))
}

/// Component count from the first start-of-frame segment
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 9 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            return Some(bytes[i + 9]);
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}

/// One page per image, each page exactly the image's pixel size in points
pub(crate) fn build_image_document(images: Vec<PageImage>) -> Result<Vec<u8>, ProcessingError> {
    if images.is_empty() {
        return Err(ProcessingError::InvalidInput("No images to convert".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for page_image in images {
        let PageImage {
            width,
            height,
            mut image,
            smask,
        } = page_image;

        if let Some(smask) = smask {
            let smask_id = doc.add_object(smask);
            image.dict.set("SMask", Object::Reference(smask_id));
        }
        let image_id = doc.add_object(image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| ProcessingError::DocumentFormat(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let resources = Dictionary::from_iter(vec![(
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Im0",
                Object::Reference(image_id),
            )])),
        )]);

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width as i64),
                    Object::Integer(height as i64),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        kids.push(doc.add_object(page));
    }

    install_page_tree(&mut doc, pages_id, &kids);
    // Image streams opt out; only content streams get compressed here
    doc.compress();

    save_document(&mut doc)
}
