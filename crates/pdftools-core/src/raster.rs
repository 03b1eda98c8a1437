//! Page rasterization through a `RasterBackend`

use crate::error::{PdfToolkitError, Result};
use crate::imaging::flatten_onto_white;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_SCALE: f64 = 2.0;
pub const DEFAULT_JPEG_QUALITY: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
}

impl RasterFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpg => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    pub format: RasterFormat,
    /// Output pixels per point
    pub scale: f64,
    /// JPEG quality in `0.0..=1.0`
    pub quality: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            format: RasterFormat::Png,
            scale: DEFAULT_SCALE,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// One encoded page image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterImage {
    pub page: u32,
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl RasterImage {
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}-page-{}.{}", stem, self.page, self.format.extension())
    }
}

/// Capability that renders pages to pixels
pub trait RasterBackend {
    fn name(&self) -> &'static str;

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>>;
}

/// A document opened by a `RasterBackend`; pages are 1-based
pub trait RasterDocument {
    fn page_count(&self) -> u32;

    fn render_page(&self, page: u32, scale: f64) -> Result<RgbaImage>;
}

/// Render and encode every page.
///
/// The first page that fails aborts the whole operation.
pub fn rasterize(
    bytes: &[u8],
    options: &RasterOptions,
    backend: &dyn RasterBackend,
) -> Result<Vec<RasterImage>> {
    let scale = if options.scale.is_finite() && options.scale > 0.0 {
        options.scale
    } else {
        DEFAULT_SCALE
    };

    let document = backend.open(bytes)?;
    let page_count = document.page_count();
    debug!(page_count, scale, backend = backend.name(), format = ?options.format, "rasterizing");

    let mut images = Vec::with_capacity(page_count as usize);
    for page in 1..=page_count {
        let bitmap = document.render_page(page, scale).map_err(|e| match e {
            PdfToolkitError::RenderError { .. } => e,
            other => PdfToolkitError::RenderError {
                page,
                reason: other.to_string(),
            },
        })?;

        let encoded = encode_bitmap(&bitmap, options.format, options.quality).map_err(|e| {
            PdfToolkitError::RenderError {
                page,
                reason: e.to_string(),
            }
        })?;

        images.push(RasterImage {
            page,
            format: options.format,
            width: bitmap.width(),
            height: bitmap.height(),
            bytes: encoded,
        });
    }

    Ok(images)
}

fn jpeg_quality(quality: f64) -> u8 {
    let quality = if quality.is_finite() {
        quality
    } else {
        DEFAULT_JPEG_QUALITY
    };
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

fn encode_bitmap(
    bitmap: &RgbaImage,
    format: RasterFormat,
    quality: f64,
) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        RasterFormat::Png => {
            PngEncoder::new(&mut out).write_image(
                bitmap.as_raw(),
                bitmap.width(),
                bitmap.height(),
                ExtendedColorType::Rgba8,
            )?;
        }
        RasterFormat::Jpg => {
            let flat = flatten_onto_white(bitmap);
            JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality)).write_image(
                flat.as_raw(),
                flat.width(),
                flat.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(out)
}
