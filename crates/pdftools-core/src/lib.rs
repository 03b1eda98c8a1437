//! Client-side PDF tools
//!
//! This crate provides the document operations behind the PDF toolkit
//! (merge, split, extract, remove, reorder, rotate, flatten, compress,
//! watermark, text editing, rasterization and image assembly) using lopdf.
//!
//! Every operation takes raw bytes, loads its own document, and returns
//! freshly serialized bytes. Operations that need a rendering library take
//! the capability explicitly (`TextLayer`, `RasterBackend`).

pub mod command;
pub mod document;
pub mod error;
pub mod fonts;
pub mod imaging;
pub mod images;
pub mod inspect;
pub mod page_set;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod raster;
#[cfg(test)]
mod testing;
pub mod text;
pub mod transform;
pub mod watermark;

pub use command::{execute, Capabilities, CommandOutput, PdfCommand, ProcessMetrics, ProcessResult};
pub use error::{ErrorKind, PdfToolkitError, ValidationError};
pub use images::{images_to_document, ImagesToPdfOptions, PageFormat, PageOrientation};
pub use inspect::{inspect_document, DocumentSummary, PageInfo, PageShape};
pub use page_set::{
    extract_pages, merge_documents, remove_pages, reorder_pages, split_document, PageRange,
    SplitOptions,
};
pub use raster::{rasterize, RasterBackend, RasterDocument, RasterFormat, RasterImage, RasterOptions};
pub use text::{
    extract_text, replace_text, ContentStreamTextLayer, ExtractedText, RawTextRun, TextItem,
    TextLayer, TextLayerDocument, TextReplacement, TextRun,
};
pub use transform::{compress_document, flatten_document, normalize_rotation, rotate_pages, RotateOptions};
pub use watermark::{add_watermark, RgbColor, WatermarkKind, WatermarkOptions, WatermarkPosition};

/// Largest page number a page list may name; bigger tokens are ignored
pub const MAX_PAGE_NUMBER: u32 = 100_000;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfToolkitError> {
    let doc = document::load(bytes)?;
    Ok(doc.get_pages().len() as u32)
}

/// Parse a page list like "3, 1-2, 7" into 1-based page numbers.
///
/// Order of first appearance is kept and duplicates are dropped. Tokens that
/// are not a number or an ascending `a-b` range are ignored, as is page 0.
pub fn parse_page_list(input: &str) -> Vec<u32> {
    use std::collections::HashSet;

    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for range in parse_page_ranges(input) {
        for page in range.start..=range.end {
            if seen.insert(page) {
                pages.push(page);
            }
        }
    }

    pages
}

/// Parse "1-3, 5" into inclusive ranges, skipping malformed tokens and
/// any that reach past `MAX_PAGE_NUMBER`
pub fn parse_page_ranges(input: &str) -> Vec<PageRange> {
    let mut ranges = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let parsed = match part.split_once('-') {
            Some((start, end)) => start
                .trim()
                .parse::<u32>()
                .ok()
                .zip(end.trim().parse::<u32>().ok()),
            None => part.parse::<u32>().ok().map(|page| (page, page)),
        };

        match parsed {
            Some((start, end)) if start >= 1 && start <= end && end <= MAX_PAGE_NUMBER => {
                ranges.push(PageRange { start, end });
            }
            _ => tracing::debug!(token = part, "ignoring malformed page token"),
        }
    }

    ranges
}
