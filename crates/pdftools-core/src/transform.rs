//! Whole-page transforms: rotate, flatten, compress

use crate::document::{self, as_number, real, DocumentBuilder};
use crate::error::Result;
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Info entries carried over when a document is rebuilt by flattening
const PRESERVED_INFO_KEYS: [&[u8]; 5] = [b"Title", b"Author", b"Subject", b"Creator", b"Producer"];

/// Hidden (bit 2) and NoView (bit 6) annotation flags
const INVISIBLE_ANNOTATION_FLAGS: i64 = 0b10 | 0b10_0000;

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateOptions {
    /// Degrees clockwise; any integer, normalized to a multiple of 90
    pub angle: i32,
    /// 1-based pages to rotate; `None` rotates every page
    pub pages: Option<Vec<u32>>,
}

impl Default for RotateOptions {
    fn default() -> Self {
        Self {
            angle: 90,
            pages: None,
        }
    }
}

/// Compose a requested rotation with the current one.
///
/// The sum is taken modulo 360 and snapped to the nearest quarter turn, so
/// the result is always 0, 90, 180 or 270.
pub fn normalize_rotation(current: f64, requested: i32) -> i64 {
    let sum = (current + requested as f64).rem_euclid(360.0);
    ((sum / 90.0).round() as i64 * 90).rem_euclid(360)
}

pub fn rotate_pages(bytes: &[u8], options: &RotateOptions) -> Result<Vec<u8>> {
    let mut doc = document::load(bytes)?;
    let pages = doc.get_pages();

    let targets: Vec<u32> = match &options.pages {
        Some(selection) => selection
            .iter()
            .copied()
            .filter(|page| pages.contains_key(page))
            .collect(),
        None => pages.keys().copied().collect(),
    };

    debug!(angle = options.angle, pages = targets.len(), "rotating pages");

    for page in targets {
        let page_id = pages[&page];
        let current = document::page_rotation(&doc, page_id);
        let rotation = normalize_rotation(current, options.angle);
        document::page_dict_mut(&mut doc, page_id)?.set("Rotate", Object::Integer(rotation));
    }

    document::save(&mut doc)
}

/// Re-emit every page without annotations or form fields.
///
/// The normal appearance of each visible annotation is drawn into the page
/// first, so filled-in field values stay on the page as plain content.
pub fn flatten_document(bytes: &[u8]) -> Result<Vec<u8>> {
    let source = document::load(bytes)?;
    let info = preserved_info(&source);

    let mut builder = DocumentBuilder::new();
    let imported = builder.import(source);
    let mut burned = 0usize;
    for &page_id in imported.ids() {
        let placed = builder.push_page(page_id)?;
        burned += burn_in_appearances(builder.document_mut(), placed)?;
        builder.page_mut(placed)?.remove(b"Annots");
    }

    debug!(pages = builder.page_count(), appearances = burned, "flattened document");

    let mut doc = builder.finish(info);
    document::save(&mut doc)
}

/// Draw each visible annotation's normal appearance as a form XObject on
/// top of the page content. Returns how many were drawn.
fn burn_in_appearances(doc: &mut Document, page_id: ObjectId) -> Result<usize> {
    let annotations: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(annots) => match document::resolve(doc, annots) {
            Object::Array(items) => items.clone(),
            _ => Vec::new(),
        },
        Err(_) => Vec::new(),
    };

    let source: &Document = doc;
    let placements: Vec<(ObjectId, [f64; 6])> = annotations
        .iter()
        .filter_map(|annot| {
            let annot = document::resolve(source, annot).as_dict().ok()?;
            appearance_placement(source, annot)
        })
        .collect();

    if placements.is_empty() {
        return Ok(0);
    }

    let mut operations = Vec::new();
    for &(stream_id, matrix) in &placements {
        let appearance = doc.get_object_mut(stream_id).and_then(Object::as_stream_mut)?;
        appearance.dict.set("Type", Object::Name(b"XObject".to_vec()));
        appearance.dict.set("Subtype", Object::Name(b"Form".to_vec()));

        let name = document::add_page_resource(
            doc,
            page_id,
            b"XObject",
            "Fm",
            Object::Reference(stream_id),
        )?;

        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("cm", matrix.iter().copied().map(real).collect()));
        operations.push(Operation::new("Do", vec![Object::Name(name)]));
        operations.push(Operation::new("Q", vec![]));
    }

    document::append_overlay(doc, page_id, operations)?;
    Ok(placements.len())
}

/// Appearance stream of a visible annotation and the matrix that maps its
/// transformed bounding box onto the annotation rectangle
fn appearance_placement(doc: &Document, annot: &Dictionary) -> Option<(ObjectId, [f64; 6])> {
    let flags = annot
        .get(b"F")
        .ok()
        .and_then(|flags| as_number(document::resolve(doc, flags)))
        .unwrap_or(0.0) as i64;
    if flags & INVISIBLE_ANNOTATION_FLAGS != 0 {
        return None;
    }

    let rect: [f64; 4] = number_array(doc, annot.get(b"Rect").ok()?)?;
    let appearances = document::resolve(doc, annot.get(b"AP").ok()?).as_dict().ok()?;

    // /N is either one stream or a dictionary of streams keyed by /AS
    let stream_id = match appearances.get(b"N").ok()? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(_) => *id,
            Object::Dictionary(states) => state_appearance(states, annot)?,
            _ => return None,
        },
        Object::Dictionary(states) => state_appearance(states, annot)?,
        _ => return None,
    };

    let stream = doc.get_object(stream_id).ok()?.as_stream().ok()?;
    let bbox: [f64; 4] = number_array(doc, stream.dict.get(b"BBox").ok()?)?;
    let matrix: [f64; 6] = stream
        .dict
        .get(b"Matrix")
        .ok()
        .and_then(|matrix| number_array(doc, matrix))
        .unwrap_or(IDENTITY);

    Some((stream_id, fit_to_rect(rect, bbox, matrix)?))
}

fn state_appearance(states: &Dictionary, annot: &Dictionary) -> Option<ObjectId> {
    let state = annot.get(b"AS").and_then(Object::as_name).ok()?;
    states.get(state).and_then(Object::as_reference).ok()
}

fn number_array<const N: usize>(doc: &Document, obj: &Object) -> Option<[f64; N]> {
    let values: Vec<f64> = document::resolve(doc, obj)
        .as_array()
        .ok()?
        .iter()
        .filter_map(|value| as_number(document::resolve(doc, value)))
        .collect();
    values.try_into().ok()
}

/// Scale and translate the form's bounding box, after its own matrix, onto
/// `rect`. `None` for a degenerate box.
fn fit_to_rect(rect: [f64; 4], bbox: [f64; 4], matrix: [f64; 6]) -> Option<[f64; 6]> {
    let corners = [
        (bbox[0], bbox[1]),
        (bbox[2], bbox[1]),
        (bbox[0], bbox[3]),
        (bbox[2], bbox[3]),
    ];

    let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
    let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let tx = matrix[0] * x + matrix[2] * y + matrix[4];
        let ty = matrix[1] * x + matrix[3] * y + matrix[5];
        x0 = x0.min(tx);
        y0 = y0.min(ty);
        x1 = x1.max(tx);
        y1 = y1.max(ty);
    }

    let (width, height) = (x1 - x0, y1 - y0);
    if width < f64::EPSILON || height < f64::EPSILON {
        return None;
    }

    let scale_x = (rect[2] - rect[0]).abs() / width;
    let scale_y = (rect[3] - rect[1]).abs() / height;
    let left = rect[0].min(rect[2]);
    let bottom = rect[1].min(rect[3]);

    Some([
        scale_x,
        0.0,
        0.0,
        scale_y,
        left - x0 * scale_x,
        bottom - y0 * scale_y,
    ])
}

/// Rebuild the document with compressed streams and minimal metadata
pub fn compress_document(bytes: &[u8]) -> Result<Vec<u8>> {
    let input_size = bytes.len();
    let source = document::load(bytes)?;

    let mut builder = DocumentBuilder::new();
    let imported = builder.import(source);
    for &page_id in imported.ids() {
        builder.push_page(page_id)?;
    }

    let mut info = Dictionary::new();
    info.set("Title", Object::string_literal("Compressed PDF"));
    info.set("Producer", Object::string_literal("PDF Toolkit"));

    let mut doc = builder.finish(Some(info));
    doc.compress();
    let output = document::save(&mut doc)?;

    debug!(input_size, output_size = output.len(), "compressed document");
    Ok(output)
}

fn preserved_info(doc: &Document) -> Option<Dictionary> {
    let mut info = Dictionary::new();
    for key in PRESERVED_INFO_KEYS {
        if let Some(value) = document::info_string(doc, key) {
            info.set(key.to_vec(), document::encode_text_string(&value));
        }
    }
    (!info.is_empty()).then_some(info)
}
