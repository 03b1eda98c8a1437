//! Image XObjects and pixel helpers shared by watermarking, rasterization
//! and image assembly

use crate::error::{PdfToolkitError, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat, RgbImage, RgbaImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};

/// An image XObject added to a document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
}

/// Image formats an input may be decoded as, in order of preference
pub(crate) const WATERMARK_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

/// Embed an image, trying `formats` in order.
///
/// JPEG data is embedded untouched with DCTDecode; anything else is decoded
/// and stored as Flate-compressed RGB, with an SMask when it has alpha.
pub(crate) fn embed_image_as(
    doc: &mut Document,
    bytes: &[u8],
    formats: &[ImageFormat],
) -> Result<EmbeddedImage> {
    for &format in formats {
        if format == ImageFormat::Jpeg {
            if let Ok(embedded) = embed_jpeg(doc, bytes) {
                return Ok(embedded);
            }
            continue;
        }
        if let Ok(decoded) = image::load_from_memory_with_format(bytes, format) {
            return embed_decoded(doc, &decoded);
        }
    }

    Err(PdfToolkitError::UnsupportedImageFormat(describe_format(bytes)))
}

/// Embed an image of any decodable format
pub(crate) fn embed_image(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => embed_jpeg(doc, bytes),
        Ok(format) => {
            let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
                PdfToolkitError::UnsupportedImageFormat(format!("{:?}: {}", format, e))
            })?;
            embed_decoded(doc, &decoded)
        }
        Err(_) => Err(PdfToolkitError::UnsupportedImageFormat(describe_format(bytes))),
    }
}

fn describe_format(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(format) => format!("{:?} could not be decoded", format),
        Err(_) => "unrecognized image data".to_string(),
    }
}

fn embed_jpeg(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage> {
    let decoder = JpegDecoder::new(Cursor::new(bytes))
        .map_err(|e| PdfToolkitError::UnsupportedImageFormat(format!("JPEG: {}", e)))?;
    let (width, height) = decoder.dimensions();

    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 => "DeviceGray",
        ExtendedColorType::Cmyk8 => "DeviceCMYK",
        _ => "DeviceRGB",
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    if let Some(decode) = jpeg_decode_array(color_space, bytes) {
        dict.set("Decode", decode);
    }
    let id = doc.add_object(Stream::new(dict, bytes.to_vec()).with_compression(false));

    Ok(EmbeddedImage { id, width, height })
}

/// Inverting `Decode` array for Adobe CMYK JPEGs
fn jpeg_decode_array(color_space: &str, bytes: &[u8]) -> Option<Vec<Object>> {
    (color_space == "DeviceCMYK" && has_adobe_marker(bytes))
        .then(|| [1, 0, 1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect())
}

/// Whether the JPEG has an Adobe APP14 segment before its scan data.
/// Adobe writers store CMYK samples inverted.
fn has_adobe_marker(bytes: &[u8]) -> bool {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return false;
        }
        let marker = bytes[pos + 1];
        match marker {
            // Fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // Start of scan or end of image
            0xDA | 0xD9 => return false,
            _ => {}
        }
        if marker == 0xEE && bytes[pos + 4..].starts_with(b"Adobe") {
            return true;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        pos += 2 + length;
    }
    false
}

fn embed_decoded(doc: &mut Document, image: &DynamicImage) -> Result<EmbeddedImage> {
    let (width, height) = (image.width(), image.height());
    let rgb = image.to_rgb8();

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if image.color().has_alpha() {
        let alpha: Vec<u8> = image.to_rgba8().pixels().map(|p| p[3]).collect();
        let smask = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        let smask_id = doc.add_object(Stream::new(smask, deflate(&alpha)?).with_compression(false));
        dict.set("SMask", Object::Reference(smask_id));
    }

    let id = doc.add_object(Stream::new(dict, deflate(rgb.as_raw())?).with_compression(false));
    Ok(EmbeddedImage { id, width, height })
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfToolkitError::OperationError(format!("Failed to deflate image: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PdfToolkitError::OperationError(format!("Failed to deflate image: {}", e)))
}

/// Composite RGBA pixels over a white background
pub(crate) fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    let mut flat = RgbImage::new(image.width(), image.height());
    for (target, source) in flat.pixels_mut().zip(image.pixels()) {
        let alpha = source[3] as u32;
        for channel in 0..3 {
            let value = source[channel] as u32 * alpha + 255 * (255 - alpha);
            target[channel] = ((value + 127) / 255) as u8;
        }
    }
    flat
}
