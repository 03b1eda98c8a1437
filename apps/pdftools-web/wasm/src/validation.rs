//! Upfront checks on user-supplied files
//!
//! `quick_validate` only looks at the header and trailer bytes, so it is
//! cheap enough to run on every dropped file. `validate_pdf` parses the
//! document and returns its summary.

use pdftools_core::{inspect_document, DocumentSummary};

/// Validate a PDF file and describe it
pub fn validate_pdf(bytes: &[u8]) -> Result<DocumentSummary, String> {
    check_header(bytes)?;

    let summary = inspect_document(bytes).map_err(|e| e.to_string())?;
    if summary.page_count == 0 {
        return Err("PDF has no pages".to_string());
    }

    Ok(summary)
}

fn check_header(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < 8 {
        return Err("File too small to be a valid PDF".to_string());
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err("Not a valid PDF file (missing %PDF- header)".to_string());
    }
    Ok(())
}

/// Header and `%%EOF` check without parsing (for large files)
pub fn quick_validate(bytes: &[u8]) -> Result<(), String> {
    check_header(bytes)?;

    let tail = if bytes.len() > 1024 {
        &bytes[bytes.len() - 1024..]
    } else {
        bytes
    };

    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err("PDF appears truncated (missing %%EOF marker)".to_string());
    }

    Ok(())
}

/// Does the byte stream look like an image format we can embed?
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}
