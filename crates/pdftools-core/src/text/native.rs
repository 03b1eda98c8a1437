//! Text layer built on lopdf content streams
//!
//! Interprets the text and graphics-state operators of each page to place
//! every shown string. String bytes are decoded with UTF-8, UTF-16BE and
//! Latin-1 fallback; widths are estimated from Helvetica metrics since
//! embedded font programs are not read.

use super::{page_id_for, RawTextRun, TextLayer, TextLayerDocument};
use crate::document::{self, as_number};
use crate::error::{PdfToolkitError, Result};
use crate::fonts::StandardFont;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Reads text straight from page content streams
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentStreamTextLayer;

impl TextLayer for ContentStreamTextLayer {
    fn name(&self) -> &'static str {
        "content-stream"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn TextLayerDocument + 'a>> {
        let doc = document::load(bytes)?;
        let pages = doc.get_pages().into_values().collect();
        Ok(Box::new(ContentStreamDocument { doc, pages }))
    }
}

struct ContentStreamDocument {
    doc: Document,
    pages: Vec<ObjectId>,
}

impl TextLayerDocument for ContentStreamDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn viewport_height(&self, page: u32) -> Result<f64> {
        let page_id = page_id_for(&self.pages, page)?;
        Ok(document::page_size(&self.doc, page_id).1)
    }

    fn text_runs(&self, page: u32) -> Result<Vec<RawTextRun>> {
        let page_id = page_id_for(&self.pages, page)?;
        let content = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| PdfToolkitError::ExtractionError(format!("page {}: {}", page, e)))?;
        let content = Content::decode(&content)
            .map_err(|e| PdfToolkitError::ExtractionError(format!("page {}: {}", page, e)))?;

        let fonts = page_font_names(&self.doc, page_id);
        Ok(TextInterpreter::new(&fonts).run(&content.operations))
    }
}

/// Resource name → BaseFont for the page's fonts
fn page_font_names(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, String> {
    let mut names = HashMap::new();

    let Some(Object::Dictionary(resources)) = document::inherited_attribute(doc, page_id, b"Resources")
    else {
        return names;
    };
    let Ok(fonts) = resources.get(b"Font") else {
        return names;
    };
    let Ok(fonts) = document::resolve(doc, fonts).as_dict() else {
        return names;
    };

    for (name, font) in fonts.iter() {
        let base_font = document::resolve(doc, font)
            .as_dict()
            .and_then(|font| font.get(b"BaseFont"))
            .and_then(Object::as_name);
        if let Ok(base_font) = base_font {
            names.insert(name.clone(), String::from_utf8_lossy(base_font).into_owned());
        }
    }

    names
}

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translation(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// Decode string bytes: UTF-8, then UTF-16BE with BOM, then Latin-1
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    bytes.iter().map(|&b| b as char).collect()
}

struct TextInterpreter<'f> {
    fonts: &'f HashMap<Vec<u8>, String>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font: Option<Vec<u8>>,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    rise: f64,
    runs: Vec<RawTextRun>,
}

impl<'f> TextInterpreter<'f> {
    /// Runs are placed in default user space, as PDF.js reports them
    fn new(fonts: &'f HashMap<Vec<u8>, String>) -> Self {
        Self {
            fonts,
            ctm: IDENTITY,
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            rise: 0.0,
            runs: Vec::new(),
        }
    }

    fn run(mut self, operations: &[Operation]) -> Vec<RawTextRun> {
        for op in operations {
            self.apply(op);
        }
        self.runs
    }

    fn numbers(op: &Operation) -> Vec<f64> {
        op.operands.iter().filter_map(as_number).collect()
    }

    fn apply(&mut self, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = Self::numbers(op)[..] {
                    self.ctm = multiply(&[a, b, c, d, e, f], &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    self.font = Some(name.clone());
                }
                if let Some(size) = op.operands.get(1).and_then(as_number) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let [leading] = Self::numbers(op)[..] {
                    self.leading = leading;
                }
            }
            "Tc" => {
                if let [spacing] = Self::numbers(op)[..] {
                    self.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let [spacing] = Self::numbers(op)[..] {
                    self.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let [scale] = Self::numbers(op)[..] {
                    self.horizontal_scale = scale / 100.0;
                }
            }
            "Ts" => {
                if let [rise] = Self::numbers(op)[..] {
                    self.rise = rise;
                }
            }
            "Td" => {
                if let [tx, ty] = Self::numbers(op)[..] {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let [tx, ty] = Self::numbers(op)[..] {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = Self::numbers(op)[..] {
                    self.text_matrix = [a, b, c, d, e, f];
                    self.line_matrix = self.text_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => {
                if let Some(string @ Object::String(..)) = op.operands.first() {
                    self.show(std::slice::from_ref(string));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    self.show(items);
                }
            }
            "'" => {
                self.next_line(0.0, -self.leading);
                if let Some(string @ Object::String(..)) = op.operands.first() {
                    self.show(std::slice::from_ref(string));
                }
            }
            "\"" => {
                if let [word_spacing, char_spacing, ..] = Self::numbers(op)[..] {
                    self.word_spacing = word_spacing;
                    self.char_spacing = char_spacing;
                }
                self.next_line(0.0, -self.leading);
                if let Some(string @ Object::String(..)) = op.operands.get(2) {
                    self.show(std::slice::from_ref(string));
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// Emit one run for a sequence of strings and kerning adjustments,
    /// advancing the text matrix past it
    fn show(&mut self, items: &[Object]) {
        let start = multiply(&self.text_matrix, &self.ctm);
        let mut text = String::new();
        let mut advance = 0.0;

        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let decoded = decode_pdf_string(bytes);
                    for c in decoded.chars() {
                        let glyph = StandardFont::Helvetica.char_width(c) as f64 / 1000.0;
                        let spacing = if c == ' ' {
                            self.char_spacing + self.word_spacing
                        } else {
                            self.char_spacing
                        };
                        advance += (glyph * self.font_size + spacing) * self.horizontal_scale;
                    }
                    text.push_str(&decoded);
                }
                other => {
                    if let Some(adjustment) = as_number(other) {
                        advance -= adjustment / 1000.0 * self.font_size * self.horizontal_scale;
                        if adjustment < -100.0 && !text.ends_with(' ') {
                            text.push(' ');
                        }
                    }
                }
            }
        }

        self.text_matrix = multiply(&translation(advance, 0.0), &self.text_matrix);

        if text.trim().is_empty() {
            return;
        }

        let rendering = multiply(
            &[
                self.font_size * self.horizontal_scale,
                0.0,
                0.0,
                self.font_size,
                0.0,
                self.rise,
            ],
            &start,
        );
        let horizontal_scale = start[0].hypot(start[1]);

        self.runs.push(RawTextRun {
            content: Some(text),
            text: None,
            transform: Some(rendering.to_vec()),
            width: Some(advance * horizontal_scale),
            height: Some(rendering[2].hypot(rendering[3])),
            font_size: Some(self.font_size),
            size: None,
            font_name: self.font.as_ref().and_then(|name| self.fonts.get(name)).cloned(),
            has_eol: false,
        });
    }
}
