//! Raster backend bound to a PDFium shared library

use crate::error::{PdfToolkitError, Result};
use crate::raster::{RasterBackend, RasterDocument};
use image::RgbaImage;
use pdfium_render::prelude::{PdfBitmapFormat, PdfDocument, PdfRenderConfig, Pdfium};
use std::path::Path;
use tracing::debug;

/// Environment variable naming a directory that holds the PDFium library
pub const PDFIUM_DIR_ENV: &str = "PDFTOOLS_PDFIUM_DIR";

pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to PDFium from `PDFTOOLS_PDFIUM_DIR`, the working directory, or
    /// the system library path.
    pub fn bind() -> Result<Self> {
        let mut candidates = Vec::new();
        if let Ok(dir) = std::env::var(PDFIUM_DIR_ENV) {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(&dir)));
        }
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(".")));

        for path in candidates {
            if let Ok(bindings) = Pdfium::bind_to_library(&path) {
                debug!(path = %path.display(), "bound PDFium");
                return Ok(Self {
                    pdfium: Pdfium::new(bindings),
                });
            }
        }

        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            PdfToolkitError::EnvironmentError(format!("PDFium library not found: {}", e))
        })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl RasterBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfToolkitError::ParseError(e.to_string()))?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl RasterDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> u32 {
        self.document.pages().len() as u32
    }

    fn render_page(&self, page: u32, scale: f64) -> Result<RgbaImage> {
        let render_error = |reason: String| PdfToolkitError::RenderError { page, reason };

        let index = page
            .checked_sub(1)
            .and_then(|index| u16::try_from(index).ok())
            .ok_or_else(|| render_error("page index out of range".into()))?;
        let pdf_page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_error(e.to_string()))?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale as f32)
            .set_format(PdfBitmapFormat::BGRA)
            .set_reverse_byte_order(false);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| render_error(e.to_string()))?;

        let width = bitmap.width().max(0) as u32;
        let height = bitmap.height().max(0) as u32;
        let source = bitmap.as_raw_bytes();
        let stride = if height == 0 {
            0
        } else {
            source.len() / height as usize
        };

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let index = y * stride + x * 4;
                let bgra = source.get(index..index + 4).unwrap_or(&[255, 255, 255, 255]);
                pixels.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
            }
        }

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| render_error("bitmap size mismatch".into()))
    }
}
