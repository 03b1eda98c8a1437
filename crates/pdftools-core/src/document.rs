//! Shared document plumbing
//!
//! Loading and saving, inherited page attributes, and the `DocumentBuilder`
//! that every page-set operation reduces to: import source documents with
//! remapped object ids, then place their pages in any order.

use crate::error::{PdfToolkitError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;

/// Attributes a page may inherit from its ancestors in the page tree
pub(crate) const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used when no MediaBox can be found
pub(crate) const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| PdfToolkitError::ParseError(e.to_string()))
}

pub(crate) fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PdfToolkitError::OperationError(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}

/// Follow a reference to its target; other objects are returned unchanged
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

pub(crate) fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

pub(crate) fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

pub(crate) fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    Ok(doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?)
}

/// Look up a page attribute, walking `/Parent` links when the page lacks it
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value).clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Width and height of a page's MediaBox in points
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let Some(Object::Array(media_box)) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_SIZE;
    };

    let coords: Vec<f64> = media_box
        .iter()
        .filter_map(|value| as_number(resolve(doc, value)))
        .collect();

    match coords.as_slice() {
        [x0, y0, x1, y1] => ((x1 - x0).abs(), (y1 - y0).abs()),
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Page rotation in degrees as stored, possibly inherited
pub(crate) fn page_rotation(doc: &Document, page_id: ObjectId) -> f64 {
    inherited_attribute(doc, page_id, b"Rotate")
        .as_ref()
        .and_then(as_number)
        .unwrap_or(0.0)
}

/// The trailer's Info dictionary, if any
pub(crate) fn document_info(doc: &Document) -> Option<&Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    resolve(doc, info).as_dict().ok()
}

/// Read a text-string entry from the Info dictionary
pub(crate) fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let value = document_info(doc)?.get(key).ok()?;
    match resolve(doc, value) {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a text string, using UTF-16BE only when Latin-1 is not enough
pub(crate) fn encode_text_string(text: &str) -> Object {
    if text.chars().all(|c| (c as u32) < 0x80) {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

/// Register `value` under a fresh name in one of the page's resource
/// categories (`Font`, `XObject`, `ExtGState`) and return the name.
///
/// Resources are materialized on the page itself so shared or inherited
/// dictionaries are never modified.
pub(crate) fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    prefix: &str,
    value: Object,
) -> Result<Vec<u8>> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };

    let mut entries = match resources.get(category) {
        Ok(obj) => match resolve(doc, obj) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let mut index = 0usize;
    let name = loop {
        let candidate = format!("{}{}", prefix, index).into_bytes();
        if !entries.has(&candidate) {
            break candidate;
        }
        index += 1;
    };

    entries.set(name.clone(), value);
    resources.set(category.to_vec(), Object::Dictionary(entries));
    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));

    Ok(name)
}

/// Append drawing operations on top of a page.
///
/// Existing content is wrapped in `q … Q` so its graphics state cannot leak
/// into the overlay.
pub(crate) fn append_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<()> {
    let overlay = Content { operations }.encode()?;

    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    if !existing.is_empty() {
        let push_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let pop_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        contents.push(Object::Reference(push_id));
        contents.extend(existing);
        contents.push(Object::Reference(pop_id));
    }
    contents.push(Object::Reference(overlay_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

/// Pages of one imported source document, in source order
#[derive(Debug, Clone)]
pub(crate) struct ImportedPages {
    ids: Vec<ObjectId>,
}

impl ImportedPages {
    /// Object id for a 1-based page number
    pub fn get(&self, page_number: u32) -> Option<ObjectId> {
        let index = page_number.checked_sub(1)? as usize;
        self.ids.get(index).copied()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }
}

/// Builds a fresh document out of pages imported from other documents
pub(crate) struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    placed: HashSet<ObjectId>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            placed: HashSet::new(),
        }
    }

    /// Move every object of `source` into the new document.
    ///
    /// Ids are shifted past the current maximum so nothing collides.
    /// Inherited page attributes are copied onto each page first, since the
    /// source page tree is discarded.
    pub fn import(&mut self, source: Document) -> ImportedPages {
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        let mut materialized = Vec::new();
        for &page_id in &source_pages {
            let Ok(page) = source.get_dictionary(page_id) else {
                continue;
            };
            for key in INHERITABLE_ATTRIBUTES {
                if page.has(key) {
                    continue;
                }
                if let Some(value) = inherited_attribute(&source, page_id, key) {
                    materialized.push((page_id, key, value));
                }
            }
        }

        let offset = self.doc.max_id;
        let source_max_id = source.max_id;
        let mut objects = source.objects;

        for (page_id, key, value) in materialized {
            if let Some(Ok(page)) = objects.get_mut(&page_id).map(Object::as_dict_mut) {
                page.set(key.to_vec(), value);
            }
        }

        for (old_id, object) in objects {
            let new_id = (old_id.0 + offset, old_id.1);
            self.doc.objects.insert(new_id, remap_object_refs(object, offset));
        }
        self.doc.max_id = self.doc.max_id.max(source_max_id + offset);

        ImportedPages {
            ids: source_pages
                .into_iter()
                .map(|(number, generation)| (number + offset, generation))
                .collect(),
        }
    }

    /// Append an imported page to the output page sequence.
    ///
    /// The first placement reuses the page object; later placements of the
    /// same page get a shallow copy sharing content and resources.
    pub fn push_page(&mut self, page_id: ObjectId) -> Result<ObjectId> {
        let target = if self.placed.insert(page_id) {
            page_id
        } else {
            let copy = self.doc.get_dictionary(page_id)?.clone();
            self.doc.add_object(Object::Dictionary(copy))
        };

        page_dict_mut(&mut self.doc, target)?.set("Parent", Object::Reference(self.pages_id));
        self.kids.push(target);
        Ok(target)
    }

    /// Append a new empty page of the given size in points
    pub fn push_blank_page(&mut self, width: f64, height: f64) -> ObjectId {
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(self.pages_id),
            "MediaBox" => vec![0.into(), 0.into(), real(width), real(height)],
            "Resources" => Dictionary::new(),
        });
        self.placed.insert(page_id);
        self.kids.push(page_id);
        page_id
    }

    pub fn page_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary> {
        page_dict_mut(&mut self.doc, page_id)
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn page_count(&self) -> u32 {
        self.kids.len() as u32
    }

    /// Write the page tree, catalog and optional Info, then drop everything
    /// no longer reachable from the trailer.
    pub fn finish(mut self, info: Option<Dictionary>) -> Document {
        let count = self.kids.len() as i64;
        let kids: Vec<Object> = self.kids.into_iter().map(Object::Reference).collect();

        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        if let Some(info) = info {
            let info_id = self.doc.add_object(Object::Dictionary(info));
            self.doc.trailer.set("Info", Object::Reference(info_id));
        }

        self.doc.prune_objects();
        self.doc
    }
}

/// Recursively shift object references by `offset`
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(dict) => Object::Dictionary(remap_dictionary(dict, offset)),
        Object::Stream(mut stream) => {
            stream.dict = remap_dictionary(stream.dict, offset);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn remap_dictionary(mut dict: Dictionary, offset: u32) -> Dictionary {
    for (_, value) in dict.iter_mut() {
        let original = std::mem::replace(value, Object::Null);
        *value = remap_object_refs(original, offset);
    }
    dict
}
