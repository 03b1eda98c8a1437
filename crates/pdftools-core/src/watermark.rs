//! Text and image watermarks
//!
//! The mark is resolved once per document (font or image XObject, base
//! size) and then stamped on every page at a position computed from that
//! page's own size.

use crate::document::{self, real};
use crate::error::Result;
use crate::fonts::{encode_win_ansi, StandardFont};
use crate::imaging::{self, WATERMARK_FORMATS};
use lopdf::content::Operation;
use lopdf::{dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Distance from the page edge for corner positions, in points
pub const MARGIN: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    #[default]
    Diagonal,
}

impl WatermarkPosition {
    /// Lower-left origin of a `mark` sized box on a `page` sized page
    pub fn place(self, page: (f64, f64), mark: (f64, f64)) -> (f64, f64) {
        let (page_width, page_height) = page;
        let (width, height) = mark;
        match self {
            WatermarkPosition::TopLeft => (MARGIN, page_height - height - MARGIN),
            WatermarkPosition::TopRight => {
                (page_width - width - MARGIN, page_height - height - MARGIN)
            }
            WatermarkPosition::BottomLeft => (MARGIN, MARGIN),
            WatermarkPosition::BottomRight => (page_width - width - MARGIN, MARGIN),
            WatermarkPosition::Center => ((page_width - width) / 2.0, (page_height - height) / 2.0),
            WatermarkPosition::Diagonal => {
                (page_width / 2.0 - width / 2.0, page_height / 2.0 - height / 2.0)
            }
        }
    }
}

/// RGB color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatermarkOptions {
    #[serde(rename = "type")]
    pub kind: WatermarkKind,
    pub text: String,
    /// Encoded PNG or JPEG bytes for image watermarks
    pub image: Option<Vec<u8>>,
    pub font_size: f64,
    /// Multiplier on `font_size`, clamped to 0.1..=2.0
    pub text_scale: f64,
    /// Clamped to 0.0..=1.0
    pub opacity: f64,
    /// Degrees counter-clockwise about the placement origin
    pub angle: f64,
    pub color: RgbColor,
    pub position: WatermarkPosition,
    /// Multiplier on the image's pixel size, clamped to 0.01..=1.0
    pub image_scale: f64,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            text: "WATERMARK".to_string(),
            image: None,
            font_size: 50.0,
            text_scale: 1.0,
            opacity: 0.3,
            angle: -45.0,
            color: RgbColor::default(),
            position: WatermarkPosition::Diagonal,
            image_scale: 0.3,
        }
    }
}

impl WatermarkOptions {
    pub fn effective_font_size(&self) -> f64 {
        self.font_size * self.text_scale.clamp(0.1, 2.0)
    }

    pub fn effective_opacity(&self) -> f64 {
        self.opacity.clamp(0.0, 1.0)
    }

    pub fn effective_image_scale(&self) -> f64 {
        self.image_scale.clamp(0.01, 1.0)
    }
}

enum Mark {
    Text {
        font_id: ObjectId,
        encoded: Vec<u8>,
        size: f64,
        width: f64,
        color: RgbColor,
    },
    Image {
        xobject_id: ObjectId,
        width: f64,
        height: f64,
    },
}

impl Mark {
    fn resolve(doc: &mut Document, options: &WatermarkOptions) -> Result<Option<Mark>> {
        match options.kind {
            WatermarkKind::Text => {
                if options.text.is_empty() {
                    return Ok(None);
                }
                let font = StandardFont::HelveticaBold;
                let size = options.effective_font_size();
                Ok(Some(Mark::Text {
                    font_id: font.embed(doc),
                    encoded: encode_win_ansi(&options.text),
                    size,
                    width: font.width_of_text_at_size(&options.text, size),
                    color: options.color,
                }))
            }
            WatermarkKind::Image => {
                let Some(bytes) = options.image.as_deref() else {
                    return Ok(None);
                };
                let embedded = imaging::embed_image_as(doc, bytes, &WATERMARK_FORMATS)?;
                let scale = options.effective_image_scale();
                Ok(Some(Mark::Image {
                    xobject_id: embedded.id,
                    width: embedded.width as f64 * scale,
                    height: embedded.height as f64 * scale,
                }))
            }
        }
    }

    fn size(&self) -> (f64, f64) {
        match self {
            Mark::Text { width, size, .. } => (*width, *size),
            Mark::Image { width, height, .. } => (*width, *height),
        }
    }
}

/// Stamp a watermark on every page
pub fn add_watermark(bytes: &[u8], options: &WatermarkOptions) -> Result<Vec<u8>> {
    let mut doc = document::load(bytes)?;

    let Some(mark) = Mark::resolve(&mut doc, options)? else {
        debug!("watermark has no content, leaving pages untouched");
        return document::save(&mut doc);
    };

    let opacity = options.effective_opacity();
    let gs_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "CA" => real(opacity),
        "ca" => real(opacity),
    });

    let pages = doc.get_pages();
    debug!(pages = pages.len(), opacity, angle = options.angle, "adding watermark");

    for (_, page_id) in pages {
        let page_size = document::page_size(&doc, page_id);
        let origin = options.position.place(page_size, mark.size());
        let gs_name = document::add_page_resource(
            &mut doc,
            page_id,
            b"ExtGState",
            "WmGs",
            Object::Reference(gs_id),
        )?;

        let operations = match &mark {
            Mark::Text {
                font_id,
                encoded,
                size,
                color,
                ..
            } => {
                let font_name = document::add_page_resource(
                    &mut doc,
                    page_id,
                    b"Font",
                    "WmF",
                    Object::Reference(*font_id),
                )?;
                text_operations(&gs_name, &font_name, encoded, *size, *color, origin, options.angle)
            }
            Mark::Image {
                xobject_id,
                width,
                height,
            } => {
                let image_name = document::add_page_resource(
                    &mut doc,
                    page_id,
                    b"XObject",
                    "WmIm",
                    Object::Reference(*xobject_id),
                )?;
                image_operations(&gs_name, &image_name, (*width, *height), origin, options.angle)
            }
        };

        document::append_overlay(&mut doc, page_id, operations)?;
    }

    document::save(&mut doc)
}

/// `[cos sin -sin cos x y]`
fn rotation_matrix(origin: (f64, f64), angle: f64) -> Vec<Object> {
    let (sin, cos) = angle.to_radians().sin_cos();
    vec![real(cos), real(sin), real(-sin), real(cos), real(origin.0), real(origin.1)]
}

fn text_operations(
    gs_name: &[u8],
    font_name: &[u8],
    encoded: &[u8],
    size: f64,
    color: RgbColor,
    origin: (f64, f64),
    angle: f64,
) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(gs_name.to_vec())]),
        Operation::new("rg", vec![real(color.r), real(color.g), real(color.b)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_name.to_vec()), real(size)]),
        Operation::new("Tm", rotation_matrix(origin, angle)),
        Operation::new(
            "Tj",
            vec![Object::String(encoded.to_vec(), lopdf::StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn image_operations(
    gs_name: &[u8],
    image_name: &[u8],
    size: (f64, f64),
    origin: (f64, f64),
    angle: f64,
) -> Vec<Operation> {
    let zero = || real(0.0);
    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(gs_name.to_vec())]),
        Operation::new("cm", rotation_matrix(origin, angle)),
        Operation::new("cm", vec![real(size.0), zero(), zero(), real(size.1), zero(), zero()]),
        Operation::new("Do", vec![Object::Name(image_name.to_vec())]),
        Operation::new("Q", vec![]),
    ]
}
