//! Rendering capabilities backed by work the browser already did
//!
//! PDF.js runs in JavaScript, so its results are handed over as plain data:
//! `getTextContent` items per page for the text layer, and canvas pixels
//! per page for rasterization.

use image::RgbaImage;
use pdftools_core::{
    get_page_count, PdfToolkitError, RasterBackend, RasterDocument, RawTextRun, TextLayer,
    TextLayerDocument,
};
use serde::Deserialize;

/// One page of PDF.js text content
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchedPage {
    /// Viewport height at scale 1
    pub viewport_height: f64,
    #[serde(default)]
    pub items: Vec<RawTextRun>,
}

/// Text layer over text content fetched by the browser, in page order
#[derive(Debug, Clone, Default)]
pub struct PrefetchedTextLayer {
    pages: Vec<PrefetchedPage>,
}

impl PrefetchedTextLayer {
    pub fn new(pages: Vec<PrefetchedPage>) -> Self {
        Self { pages }
    }
}

/// The page lists must describe the same document the bytes hold
fn check_page_count(bytes: &[u8], supplied: usize, what: &str) -> Result<(), PdfToolkitError> {
    let expected = get_page_count(bytes)?;
    if supplied as u32 != expected {
        return Err(PdfToolkitError::EnvironmentError(format!(
            "{} covers {} pages but the document has {}",
            what, supplied, expected
        )));
    }
    Ok(())
}

impl TextLayer for PrefetchedTextLayer {
    fn name(&self) -> &'static str {
        "pdfjs"
    }

    fn open<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Result<Box<dyn TextLayerDocument + 'a>, PdfToolkitError> {
        check_page_count(bytes, self.pages.len(), "text content")?;
        Ok(Box::new(PrefetchedTextDocument { pages: &self.pages }))
    }
}

struct PrefetchedTextDocument<'a> {
    pages: &'a [PrefetchedPage],
}

impl PrefetchedTextDocument<'_> {
    fn page(&self, page: u32) -> Result<&PrefetchedPage, PdfToolkitError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .ok_or_else(|| {
                PdfToolkitError::ExtractionError(format!("no text content for page {}", page))
            })
    }
}

impl TextLayerDocument for PrefetchedTextDocument<'_> {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn viewport_height(&self, page: u32) -> Result<f64, PdfToolkitError> {
        Ok(self.page(page)?.viewport_height)
    }

    fn text_runs(&self, page: u32) -> Result<Vec<RawTextRun>, PdfToolkitError> {
        Ok(self.page(page)?.items.clone())
    }
}

/// Canvas pixels for one page, row-major RGBA
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Raster backend over pages the browser already drew
#[derive(Debug, Clone, Default)]
pub struct RenderedPages {
    pages: Vec<RgbaImage>,
}

impl RenderedPages {
    /// Fails when a page's buffer does not match its dimensions
    pub fn new(pages: Vec<RenderedPage>) -> Result<Self, PdfToolkitError> {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| {
                let (width, height) = (page.width, page.height);
                RgbaImage::from_raw(width, height, page.rgba).ok_or_else(|| {
                    PdfToolkitError::RenderError {
                        page: index as u32 + 1,
                        reason: format!("pixel buffer does not match {}x{}", width, height),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pages })
    }
}

impl RasterBackend for RenderedPages {
    fn name(&self) -> &'static str {
        "canvas"
    }

    fn open<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Result<Box<dyn RasterDocument + 'a>, PdfToolkitError> {
        check_page_count(bytes, self.pages.len(), "rendered pages")?;
        Ok(Box::new(RenderedDocument { pages: &self.pages }))
    }
}

struct RenderedDocument<'a> {
    pages: &'a [RgbaImage],
}

impl RasterDocument for RenderedDocument<'_> {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Pages were drawn by the caller at the scale it asked for
    fn render_page(&self, page: u32, _scale: f64) -> Result<RgbaImage, PdfToolkitError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .cloned()
            .ok_or_else(|| PdfToolkitError::RenderError {
                page,
                reason: "page was not rendered".to_string(),
            })
    }
}
