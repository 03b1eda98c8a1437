//! Positioned text extraction and in-place text replacement
//!
//! Text comes from a `TextLayer`, the capability that knows how to turn a
//! document into raw text runs. Runs are loosely typed (different renderers
//! name their fields differently) and are mapped into the canonical
//! `TextRun` in exactly one place, `TextRun::from_raw`.

pub mod native;

pub use native::ContentStreamTextLayer;

use crate::document::{self, real};
use crate::error::{PdfToolkitError, Result};
use crate::fonts::{encode_win_ansi, StandardFont};
use lopdf::content::Operation;
use lopdf::{Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Estimated glyph advance as a fraction of the font size
const WIDTH_PER_CHAR: f64 = 0.6;

/// Share of the run height that sits below the baseline
const DESCENT_RATIO: f64 = 0.25;

/// Padding around the white cover rectangle, in points
const COVER_PADDING: f64 = 1.0;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A text run as reported by a renderer, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTextRun {
    #[serde(rename = "str")]
    pub content: Option<String>,
    pub text: Option<String>,
    /// Text rendering matrix `[a b c d e f]` in page space
    pub transform: Option<Vec<f64>>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub font_size: Option<f64>,
    pub size: Option<f64>,
    pub font_name: Option<String>,
    #[serde(rename = "hasEOL")]
    pub has_eol: bool,
}

impl RawTextRun {
    fn probe_text(&self) -> Option<&str> {
        self.content.as_deref().or(self.text.as_deref())
    }
}

/// A normalized run in top-left page coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    /// Distance from the top of the viewport to the baseline
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub font_name: Option<String>,
}

impl TextRun {
    /// Normalize a raw run, or `None` when it carries no visible text
    pub fn from_raw(raw: &RawTextRun, viewport_height: f64) -> Option<TextRun> {
        let original = raw.probe_text()?;
        let text = original.trim();
        if text.is_empty() {
            return None;
        }

        let transform = match raw.transform.as_deref() {
            Some(t) if t.len() == 6 => t,
            _ => &IDENTITY,
        };

        let font_size = [raw.height, raw.font_size, raw.size]
            .into_iter()
            .flatten()
            .find(|size| *size > 0.0)
            .unwrap_or(DEFAULT_FONT_SIZE);

        let width = raw
            .width
            .filter(|width| *width > 0.0)
            .unwrap_or(original.chars().count() as f64 * font_size * WIDTH_PER_CHAR);

        Some(TextRun {
            text: text.to_string(),
            x: transform[4],
            y: viewport_height - transform[5],
            width,
            height: font_size,
            font_size,
            font_name: raw.font_name.clone(),
        })
    }
}

/// One extracted run with a stable id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextItem {
    /// `page-<n>-item-<k>`
    pub id: String,
    pub page: u32,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
}

impl TextItem {
    pub fn make_id(page: u32, index: usize) -> String {
        format!("page-{}-item-{}", page, index)
    }

    /// Page number encoded in an item id
    pub fn page_of_id(id: &str) -> Option<u32> {
        let rest = id.strip_prefix("page-")?;
        let (page, index) = rest.split_once("-item-")?;
        index.parse::<usize>().ok()?;
        page.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    pub items: Vec<TextItem>,
    pub page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextReplacement {
    pub id: String,
    pub new_text: String,
}

/// Capability that turns document bytes into raw text runs
pub trait TextLayer {
    fn name(&self) -> &'static str;

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn TextLayerDocument + 'a>>;
}

/// A document opened by a `TextLayer`; pages are 1-based
pub trait TextLayerDocument {
    fn page_count(&self) -> u32;

    /// Height of the unrotated page viewport at scale 1
    fn viewport_height(&self, page: u32) -> Result<f64>;

    fn text_runs(&self, page: u32) -> Result<Vec<RawTextRun>>;
}

/// Items of one page, numbered over non-empty runs
fn page_items(document: &dyn TextLayerDocument, page: u32) -> Result<Vec<TextItem>> {
    let viewport_height = document.viewport_height(page)?;
    let runs = document.text_runs(page)?;

    Ok(runs
        .iter()
        .filter_map(|raw| TextRun::from_raw(raw, viewport_height))
        .enumerate()
        .map(|(index, run)| TextItem {
            id: TextItem::make_id(page, index),
            page,
            text: run.text,
            x: run.x,
            y: run.y,
            width: run.width,
            height: run.height,
            font_size: run.font_size,
            font_name: run.font_name,
        })
        .collect())
}

/// Extract every positioned text run.
///
/// Pages whose runs cannot be read are logged and skipped; a document with
/// no text at all is an error.
pub fn extract_text(bytes: &[u8], layer: &dyn TextLayer) -> Result<ExtractedText> {
    let document = layer.open(bytes)?;
    let page_count = document.page_count();

    let mut items = Vec::new();
    for page in 1..=page_count {
        match page_items(document.as_ref(), page) {
            Ok(page_items) => items.extend(page_items),
            Err(e) => warn!(page, layer = layer.name(), error = %e, "skipping unreadable page"),
        }
    }

    if items.is_empty() {
        return Err(PdfToolkitError::NoExtractableText);
    }

    debug!(page_count, items = items.len(), layer = layer.name(), "extracted text");
    Ok(ExtractedText { items, page_count })
}

/// Cover each matched item with a white box and draw its new text on top.
///
/// Positions are found by extracting again with the same layer, so ids
/// refer to the same runs as long as the bytes are unchanged. Ids that match
/// nothing are ignored.
pub fn replace_text(
    bytes: &[u8],
    replacements: &[TextReplacement],
    layer: &dyn TextLayer,
) -> Result<Vec<u8>> {
    let mut doc = document::load(bytes)?;

    let mut by_page: BTreeMap<u32, Vec<&TextReplacement>> = BTreeMap::new();
    for replacement in replacements {
        match TextItem::page_of_id(&replacement.id) {
            Some(page) => by_page.entry(page).or_default().push(replacement),
            None => debug!(id = %replacement.id, "ignoring malformed item id"),
        }
    }

    if by_page.is_empty() {
        return document::save(&mut doc);
    }

    let layer_document = layer.open(bytes)?;
    let pages = doc.get_pages();
    let mut replacement_font = None;
    let mut replaced = 0usize;

    for (page, page_replacements) in by_page {
        let Some(&page_id) = pages.get(&page) else {
            continue;
        };

        let viewport_height = layer_document.viewport_height(page)?;
        let items = page_items(layer_document.as_ref(), page)?;

        let matched: Vec<(&TextItem, &str)> = items
            .iter()
            .filter_map(|item| {
                page_replacements
                    .iter()
                    .find(|r| r.id == item.id)
                    .map(|r| (item, r.new_text.as_str()))
            })
            .collect();

        if matched.is_empty() {
            continue;
        }

        let font_id =
            *replacement_font.get_or_insert_with(|| StandardFont::Helvetica.embed(&mut doc));
        let font_name = document::add_page_resource(
            &mut doc,
            page_id,
            b"Font",
            "RpF",
            Object::Reference(font_id),
        )?;

        let mut operations = Vec::new();
        for (item, new_text) in &matched {
            operations.extend(replacement_operations(item, new_text, viewport_height, &font_name));
        }
        replaced += matched.len();

        document::append_overlay(&mut doc, page_id, operations)?;
    }

    debug!(requested = replacements.len(), replaced, "replaced text");
    document::save(&mut doc)
}

fn replacement_operations(
    item: &TextItem,
    new_text: &str,
    viewport_height: f64,
    font_name: &[u8],
) -> Vec<Operation> {
    let baseline = viewport_height - item.y;
    let descent = item.height * DESCENT_RATIO;

    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![real(1.0), real(1.0), real(1.0)]),
        Operation::new(
            "re",
            vec![
                real(item.x - COVER_PADDING),
                real(baseline - descent - COVER_PADDING),
                real(item.width + 2.0 * COVER_PADDING),
                real(item.height + 2.0 * COVER_PADDING),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("rg", vec![real(0.0), real(0.0), real(0.0)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_name.to_vec()), real(item.font_size)]),
        Operation::new("Td", vec![real(item.x), real(baseline)]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(new_text), lopdf::StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Object id of page `page` or an extraction error
pub(crate) fn page_id_for(pages: &[ObjectId], page: u32) -> Result<ObjectId> {
    page.checked_sub(1)
        .and_then(|index| pages.get(index as usize))
        .copied()
        .ok_or_else(|| PdfToolkitError::ExtractionError(format!("page {} does not exist", page)))
}
