//! WASM bindings for the PDF toolkit
//!
//! Each tool is one stateless function: bytes in, bytes (or a list of
//! artifacts) out. Options are plain JS objects and may be omitted to use
//! the defaults. Failures reject with the error message as a string.
//!
//! Text tools accept the page-by-page PDF.js text content the page already
//! fetched for display; without it the document's content streams are read
//! directly. Rasterization encodes canvases the page drew with PDF.js.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { mergePdfs, rotatePdf, extractText } from './pkg/pdftools_wasm.js';
//!
//! await init();
//!
//! const merged = mergePdfs([bytesA, bytesB]);
//! const rotated = rotatePdf(merged, { angle: 90, pages: [1] });
//!
//! const pages = [];
//! for (let i = 1; i <= pdf.numPages; i++) {
//!   const page = await pdf.getPage(i);
//!   const { items } = await page.getTextContent();
//!   pages.push({ viewportHeight: page.getViewport({ scale: 1 }).height, items });
//! }
//! const { items } = extractText(rotated, pages);
//! ```

pub mod capabilities;
pub mod validation;

#[cfg(test)]
mod test_support;

use capabilities::{PrefetchedPage, PrefetchedTextLayer, RenderedPage, RenderedPages};
use js_sys::{Array, Object, Reflect, Uint8Array};
use pdftools_core::{
    ContentStreamTextLayer, ExtractedText, ImagesToPdfOptions, PdfCommand, PdfToolkitError,
    ProcessResult, RasterOptions, RotateOptions, SplitOptions, TextLayer, TextReplacement,
    WatermarkOptions,
};
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

pub use pdftools_core::{DocumentSummary, PageInfo};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&"PDF toolkit WASM initialized".into());
}

/// Get the library version
#[wasm_bindgen(js_name = getVersion)]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js(error: PdfToolkitError) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn serialization_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("Serialization error: {}", error))
}

/// Deserialize options, falling back to defaults when the caller passed none
fn options_from_js<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))
}

fn to_js_value<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(serialization_error)
}

/// Copy every `Uint8Array` (or `ArrayBuffer`) in a JS array
fn byte_arrays(values: &Array) -> Vec<Vec<u8>> {
    values.iter().map(|value| Uint8Array::new(&value).to_vec()).collect()
}

fn documents_to_js(documents: Vec<Vec<u8>>) -> Array {
    documents
        .iter()
        .map(|bytes| JsValue::from(Uint8Array::from(bytes.as_slice())))
        .collect()
}

/// Text layer for the text tools: PDF.js content when supplied, otherwise
/// the content-stream reader
fn text_layer_from_js(text_pages: JsValue) -> Result<Box<dyn TextLayer>, JsValue> {
    if text_pages.is_undefined() || text_pages.is_null() {
        return Ok(Box::new(ContentStreamTextLayer));
    }
    let pages: Vec<PrefetchedPage> = serde_wasm_bindgen::from_value(text_pages)
        .map_err(|e| JsValue::from_str(&format!("Invalid text content: {}", e)))?;
    Ok(Box::new(PrefetchedTextLayer::new(pages)))
}

fn number_field(object: &JsValue, key: &str) -> Result<u32, JsValue> {
    Reflect::get(object, &JsValue::from_str(key))?
        .as_f64()
        .filter(|value| *value >= 0.0 && value.fract() == 0.0)
        .map(|value| value as u32)
        .ok_or_else(|| JsValue::from_str(&format!("Rendered page needs a whole-number {}", key)))
}

/// Read `{ width, height, data }` objects such as canvas `ImageData`
fn rendered_pages_from_js(rendered: &Array) -> Result<RenderedPages, JsValue> {
    let pages = rendered
        .iter()
        .map(|page| {
            let data = Reflect::get(&page, &JsValue::from_str("data"))?;
            Ok(RenderedPage {
                width: number_field(&page, "width")?,
                height: number_field(&page, "height")?,
                rgba: Uint8Array::new(&data).to_vec(),
            })
        })
        .collect::<Result<Vec<_>, JsValue>>()?;
    RenderedPages::new(pages).map_err(to_js)
}

/// Quick validation check for a PDF file
#[wasm_bindgen(js_name = quickValidate)]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    validation::quick_validate(bytes).map_err(|e| JsValue::from_str(&e))
}

/// Document metadata and per-page sizes, rotations and orientations
#[wasm_bindgen(js_name = getPdfInfo)]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let summary = validation::validate_pdf(bytes).map_err(|e| JsValue::from_str(&e))?;
    to_js_value(&summary)
}

#[wasm_bindgen(js_name = getPageCount)]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    pdftools_core::get_page_count(bytes).map_err(to_js)
}

/// MIME type of a supported image, or undefined
#[wasm_bindgen(js_name = sniffImage)]
pub fn sniff_image(bytes: &[u8]) -> Option<String> {
    validation::sniff_image(bytes).map(str::to_string)
}

/// Parse "1-3, 5" into page numbers, first appearance first
#[wasm_bindgen(js_name = parsePageList)]
pub fn parse_page_list(input: &str) -> Vec<u32> {
    pdftools_core::parse_page_list(input)
}

#[wasm_bindgen(js_name = mergePdfs)]
pub fn merge_pdfs(files: Array) -> Result<Vec<u8>, JsValue> {
    pdftools_core::merge_documents(byte_arrays(&files)).map_err(to_js)
}

/// Split into several documents.
///
/// `options` is `{ by: "pages", pages: [1, 3] }` or
/// `{ by: "ranges", ranges: [{ start: 1, end: 2 }] }`.
#[wasm_bindgen(js_name = splitPdf)]
pub fn split_pdf(bytes: &[u8], options: JsValue) -> Result<Array, JsValue> {
    let options: SplitOptions = serde_wasm_bindgen::from_value(options)
        .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?;
    let parts = pdftools_core::split_document(bytes, &options).map_err(to_js)?;
    Ok(documents_to_js(parts))
}

#[wasm_bindgen(js_name = extractPages)]
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, JsValue> {
    pdftools_core::extract_pages(bytes, pages).map_err(to_js)
}

#[wasm_bindgen(js_name = removePages)]
pub fn remove_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, JsValue> {
    pdftools_core::remove_pages(bytes, pages).map_err(to_js)
}

#[wasm_bindgen(js_name = reorderPages)]
pub fn reorder_pages(bytes: &[u8], page_order: &[u32]) -> Result<Vec<u8>, JsValue> {
    pdftools_core::reorder_pages(bytes, page_order).map_err(to_js)
}

#[wasm_bindgen(js_name = rotatePdf)]
pub fn rotate_pdf(bytes: &[u8], options: JsValue) -> Result<Vec<u8>, JsValue> {
    let options: RotateOptions = options_from_js(options)?;
    pdftools_core::rotate_pages(bytes, &options).map_err(to_js)
}

#[wasm_bindgen(js_name = flattenPdf)]
pub fn flatten_pdf(bytes: &[u8]) -> Result<Vec<u8>, JsValue> {
    pdftools_core::flatten_document(bytes).map_err(to_js)
}

#[wasm_bindgen(js_name = compressPdf)]
pub fn compress_pdf(bytes: &[u8]) -> Result<Vec<u8>, JsValue> {
    pdftools_core::compress_document(bytes).map_err(to_js)
}

#[wasm_bindgen(js_name = addWatermark)]
pub fn add_watermark(bytes: &[u8], options: JsValue) -> Result<Vec<u8>, JsValue> {
    let options: WatermarkOptions = options_from_js(options)?;
    pdftools_core::add_watermark(bytes, &options).map_err(to_js)
}

/// Positioned text items; `text_pages` is optional PDF.js text content
#[wasm_bindgen(js_name = extractText)]
pub fn extract_text(bytes: &[u8], text_pages: JsValue) -> Result<JsValue, JsValue> {
    let layer = text_layer_from_js(text_pages)?;
    let extracted: ExtractedText =
        pdftools_core::extract_text(bytes, layer.as_ref()).map_err(to_js)?;
    to_js_value(&extracted)
}

/// Apply `[{ id, newText }]` edits to items returned by `extractText`.
///
/// Pass the same `text_pages` used for extraction so ids line up.
#[wasm_bindgen(js_name = replaceText)]
pub fn replace_text(
    bytes: &[u8],
    replacements: JsValue,
    text_pages: JsValue,
) -> Result<Vec<u8>, JsValue> {
    let replacements: Vec<TextReplacement> = serde_wasm_bindgen::from_value(replacements)
        .map_err(|e| JsValue::from_str(&format!("Invalid replacements: {}", e)))?;
    let layer = text_layer_from_js(text_pages)?;
    pdftools_core::replace_text(bytes, &replacements, layer.as_ref()).map_err(to_js)
}

/// Encode canvases drawn by PDF.js, one per page, as PNG or JPEG.
///
/// Resolves to `[{ page, width, height, mimeType, fileName, bytes }]`.
#[wasm_bindgen(js_name = rasterizePdf)]
pub fn rasterize_pdf(
    bytes: &[u8],
    rendered: Array,
    options: JsValue,
    file_stem: &str,
) -> Result<Array, JsValue> {
    let options: RasterOptions = options_from_js(options)?;
    let backend = rendered_pages_from_js(&rendered)?;
    let images = pdftools_core::rasterize(bytes, &options, &backend).map_err(to_js)?;

    images
        .iter()
        .map(|image| {
            let entry = Object::new();
            Reflect::set(&entry, &"page".into(), &image.page.into())?;
            Reflect::set(&entry, &"width".into(), &image.width.into())?;
            Reflect::set(&entry, &"height".into(), &image.height.into())?;
            Reflect::set(&entry, &"mimeType".into(), &image.format.mime_type().into())?;
            Reflect::set(&entry, &"fileName".into(), &image.file_name(file_stem).into())?;
            Reflect::set(
                &entry,
                &"bytes".into(),
                &Uint8Array::from(image.bytes.as_slice()).into(),
            )?;
            Ok(JsValue::from(entry))
        })
        .collect()
}

#[wasm_bindgen(js_name = imagesToPdf)]
pub fn images_to_pdf(images: Array, options: JsValue) -> Result<Vec<u8>, JsValue> {
    let options: ImagesToPdfOptions = options_from_js(options)?;
    pdftools_core::images_to_document(&byte_arrays(&images), &options).map_err(to_js)
}

/// Run a JSON-encoded command and return the JSON result envelope.
///
/// Never rejects: failures are reported in the envelope.
#[wasm_bindgen(js_name = runCommand)]
pub fn run_command(command_json: &str) -> String {
    let started = js_sys::Date::now();
    let result = run_command_internal(command_json, || js_sys::Date::now() - started);
    result
        .to_json()
        .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{}"}}"#, e))
}

/// Internal method to run a command (testable without JsValue)
fn run_command_internal(command_json: &str, elapsed_ms: impl Fn() -> f64) -> ProcessResult {
    let command: PdfCommand = match serde_json::from_str(command_json) {
        Ok(command) => command,
        Err(e) => {
            return ProcessResult::failure(&PdfToolkitError::SerializationError(e.to_string()))
        }
    };

    let input_size = command.input_size();
    let text_layer = ContentStreamTextLayer;
    let capabilities = pdftools_core::Capabilities {
        text_layer: Some(&text_layer),
        raster: None,
    };

    match pdftools_core::execute(command, &capabilities) {
        Ok(output) => ProcessResult::success(&output, input_size, elapsed_ms().max(0.0) as u64),
        Err(e) => ProcessResult::failure(&e),
    }
}

/// Format bytes as human-readable string
#[wasm_bindgen(js_name = formatBytes)]
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
