//! Document and page summaries for file pickers and page grids

use crate::document::{self, info_string, page_rotation, page_size};
use crate::error::Result;
use crate::transform::normalize_rotation;
use serde::Serialize;

/// Orientation of a page as displayed, after its rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageShape {
    Portrait,
    Landscape,
    Square,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based
    pub page: u32,
    /// MediaBox width in points
    pub width: f64,
    /// MediaBox height in points
    pub height: f64,
    /// Normalized to 0, 90, 180 or 270
    pub rotation: i64,
    pub shape: PageShape,
}

impl PageInfo {
    fn new(page: u32, (width, height): (f64, f64), rotation: i64) -> Self {
        let (shown_width, shown_height) = if rotation % 180 == 0 {
            (width, height)
        } else {
            (height, width)
        };

        let shape = if (shown_width - shown_height).abs() < 1.0 {
            PageShape::Square
        } else if shown_width > shown_height {
            PageShape::Landscape
        } else {
            PageShape::Portrait
        };

        Self {
            page,
            width,
            height,
            rotation,
            shape,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub page_count: u32,
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub pages: Vec<PageInfo>,
}

/// Parse a document and describe it and each of its pages
pub fn inspect_document(bytes: &[u8]) -> Result<DocumentSummary> {
    let doc = document::load(bytes)?;

    let pages = doc
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| {
            let rotation = normalize_rotation(page_rotation(&doc, page_id), 0);
            PageInfo::new(number, page_size(&doc, page_id), rotation)
        })
        .collect::<Vec<_>>();

    Ok(DocumentSummary {
        page_count: pages.len() as u32,
        version: doc.version.clone(),
        encrypted: doc.is_encrypted(),
        size_bytes: bytes.len(),
        title: non_empty(info_string(&doc, b"Title")),
        author: non_empty(info_string(&doc, b"Author")),
        subject: non_empty(info_string(&doc, b"Subject")),
        creator: non_empty(info_string(&doc, b"Creator")),
        producer: non_empty(info_string(&doc, b"Producer")),
        pages,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
