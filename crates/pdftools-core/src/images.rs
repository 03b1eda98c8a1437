//! Assemble images into a document, one page per image

use crate::document::{self, real, DocumentBuilder};
use crate::error::{PdfToolkitError, Result, ValidationError};
use crate::imaging::{self, flatten_onto_white};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder};
use lopdf::content::Operation;
use lopdf::Object;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Longest side after recompression, in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 1920;

/// Size recompression aims for, in bytes
pub const TARGET_IMAGE_BYTES: usize = 1024 * 1024;

const POINTS_PER_MM: f64 = 72.0 / 25.4;

const JPEG_QUALITY_STEPS: [u8; 6] = [90, 80, 70, 60, 50, 40];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
}

impl PageFormat {
    /// Portrait width and height in millimetres
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::Letter => (215.9, 279.4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImagesToPdfOptions {
    pub orientation: PageOrientation,
    pub format: PageFormat,
    /// Margin on every side, in millimetres
    pub margin: f64,
    /// Downscale and recompress large images before embedding
    pub compress: bool,
}

impl Default for ImagesToPdfOptions {
    fn default() -> Self {
        Self {
            orientation: PageOrientation::Portrait,
            format: PageFormat::A4,
            margin: 10.0,
            compress: true,
        }
    }
}

impl ImagesToPdfOptions {
    /// Page size in millimetres after applying orientation
    pub fn page_size_mm(&self) -> (f64, f64) {
        let (width, height) = self.format.size_mm();
        match self.orientation {
            PageOrientation::Portrait => (width, height),
            PageOrientation::Landscape => (height, width),
        }
    }
}

/// Size and lower-left position, in page units, of an image scaled to fit
/// inside the margins and centered
pub fn fit_image(page: (f64, f64), margin: f64, image: (f64, f64)) -> (f64, f64, f64, f64) {
    let (page_width, page_height) = page;
    let (image_width, image_height) = image;
    let ratio = ((page_width - 2.0 * margin) / image_width)
        .min((page_height - 2.0 * margin) / image_height);
    let width = image_width * ratio;
    let height = image_height * ratio;
    (width, height, (page_width - width) / 2.0, (page_height - height) / 2.0)
}

/// Re-encode as JPEG when the image is too large in pixels or bytes.
///
/// Returns `None` when the image is already within bounds.
fn recompress(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PdfToolkitError::UnsupportedImageFormat(e.to_string()))?;

    let oversized = decoded.width().max(decoded.height()) > MAX_IMAGE_DIMENSION;
    if !oversized && bytes.len() <= TARGET_IMAGE_BYTES {
        return Ok(None);
    }

    let resized = if oversized {
        decoded.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Triangle)
    } else {
        decoded
    };
    let flat = flatten_onto_white(&resized.to_rgba8());

    let mut smallest = Vec::new();
    for quality in JPEG_QUALITY_STEPS {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(flat.as_raw(), flat.width(), flat.height(), ExtendedColorType::Rgb8)
            .map_err(|e| PdfToolkitError::OperationError(e.to_string()))?;
        let fits = out.len() <= TARGET_IMAGE_BYTES;
        smallest = out;
        if fits {
            break;
        }
    }

    Ok(Some(smallest))
}

/// Build a document with one page per image, in input order
pub fn images_to_document(images: &[Vec<u8>], options: &ImagesToPdfOptions) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(ValidationError::NoImages.into());
    }

    let (page_width_mm, page_height_mm) = options.page_size_mm();
    let margin_mm = options.margin.clamp(0.0, page_width_mm.min(page_height_mm) / 4.0);
    let page_width = page_width_mm * POINTS_PER_MM;
    let page_height = page_height_mm * POINTS_PER_MM;

    debug!(images = images.len(), ?options, "assembling images");

    let mut builder = DocumentBuilder::new();

    for (index, bytes) in images.iter().enumerate() {
        let prepared: Cow<[u8]> = if options.compress {
            match recompress(bytes) {
                Ok(Some(smaller)) if smaller.len() < bytes.len() => Cow::Owned(smaller),
                Ok(_) => Cow::Borrowed(bytes),
                Err(e) => {
                    warn!(index, error = %e, "recompression failed, embedding original");
                    Cow::Borrowed(bytes)
                }
            }
        } else {
            Cow::Borrowed(bytes)
        };

        let page_id = builder.push_blank_page(page_width, page_height);
        let doc = builder.document_mut();
        let embedded = imaging::embed_image(doc, &prepared)?;

        // Pixel dimensions are fitted in millimetre space, then converted
        let (width, height, x, y) = fit_image(
            (page_width_mm, page_height_mm),
            margin_mm,
            (embedded.width as f64, embedded.height as f64),
        );

        let name = document::add_page_resource(
            doc,
            page_id,
            b"XObject",
            "Im",
            Object::Reference(embedded.id),
        )?;

        let zero = || real(0.0);
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(width * POINTS_PER_MM),
                    zero(),
                    zero(),
                    real(height * POINTS_PER_MM),
                    real(x * POINTS_PER_MM),
                    real(y * POINTS_PER_MM),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name)]),
            Operation::new("Q", vec![]),
        ];
        document::append_overlay(doc, page_id, operations)?;
    }

    let mut doc = builder.finish(None);
    document::save(&mut doc)
}
