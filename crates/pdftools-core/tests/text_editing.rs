//! Text extraction, replacement and overlays read back through the
//! content-stream text layer

mod common;

use common::{create_image_only_pdf, create_offset_pdf, create_synthetic_pdf, page_contents};
use lopdf::content::Content;
use lopdf::{Document, Object};
use pdftools_core::{
    add_watermark, extract_text, replace_text, ContentStreamTextLayer, ErrorKind, PdfToolkitError,
    RawTextRun, TextLayer, TextLayerDocument, TextReplacement, WatermarkOptions,
};
use pretty_assertions::assert_eq;

#[test]
fn extracts_positioned_items_per_page() {
    let source = create_synthetic_pdf(2, "Invoice");
    let extracted = extract_text(&source, &ContentStreamTextLayer).unwrap();

    assert_eq!(extracted.page_count, 2);
    assert_eq!(extracted.items.len(), 4);
    assert!(extracted
        .items
        .iter()
        .all(|item| item.page >= 1 && item.page <= extracted.page_count));

    let first = &extracted.items[0];
    assert_eq!(first.id, "page-1-item-0");
    assert_eq!(first.text, "Invoice Page 1");
    assert_eq!(first.x, 100.0);
    assert_eq!(first.y, 92.0);
    assert_eq!(first.font_size, 12.0);
    assert_eq!(first.font_name.as_deref(), Some("Helvetica"));

    let total = &extracted.items[1];
    assert_eq!(total.id, "page-1-item-1");
    assert_eq!(total.text, "Total: $100");
    assert_eq!(total.y, 112.0);
}

#[test]
fn image_only_document_has_no_text() {
    let err = extract_text(&create_image_only_pdf(), &ContentStreamTextLayer).unwrap_err();
    assert!(matches!(err, PdfToolkitError::NoExtractableText));
    assert_eq!(err.kind(), ErrorKind::Extraction);
}

#[test]
fn extraction_ids_are_stable() {
    let source = create_synthetic_pdf(3, "Stable");
    let first = extract_text(&source, &ContentStreamTextLayer).unwrap();
    let second = extract_text(&source, &ContentStreamTextLayer).unwrap();
    assert_eq!(first, second);
}

#[test]
fn replacement_draws_new_text_over_old_position() {
    let source = create_synthetic_pdf(2, "Invoice");
    let replacements = vec![TextReplacement {
        id: "page-1-item-1".to_string(),
        new_text: "Total: $250".to_string(),
    }];

    let edited = replace_text(&source, &replacements, &ContentStreamTextLayer).unwrap();
    let extracted = extract_text(&edited, &ContentStreamTextLayer).unwrap();

    let page_one: Vec<_> = extracted.items.iter().filter(|item| item.page == 1).collect();
    assert_eq!(page_one.len(), 3);

    let added = page_one
        .iter()
        .find(|item| item.text == "Total: $250")
        .expect("replacement text present");
    assert_eq!(added.x, 100.0);
    assert_eq!(added.y, 112.0);
    assert_eq!(added.font_size, 12.0);

    // Page 2 untouched
    let page_two = extracted.items.iter().filter(|item| item.page == 2).count();
    assert_eq!(page_two, 2);

    // Cover rectangle is painted before the new text
    let content = &page_contents(&edited)[0];
    let cover = content.find(" re").expect("cover rectangle");
    let text = content.rfind("Total: $250").expect("new text");
    assert!(cover < text);
}

/// Numeric operands of every `operator` in page 1's content
fn operands_of(bytes: &[u8], operator: &str) -> Vec<Vec<f64>> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = doc.get_pages()[&1];
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == operator)
        .map(|op| {
            op.operands
                .iter()
                .filter_map(|value| match value {
                    Object::Integer(i) => Some(*i as f64),
                    Object::Real(r) => Some(*r as f64),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

#[test]
fn replacement_lands_on_glyphs_with_offset_media_box() {
    let source = create_offset_pdf("Secret");
    let original = extract_text(&source, &ContentStreamTextLayer).unwrap();
    assert_eq!(original.items[0].x, 100.0);

    let replacements = vec![TextReplacement {
        id: "page-1-item-0".to_string(),
        new_text: "Public".to_string(),
    }];
    let edited = replace_text(&source, &replacements, &ContentStreamTextLayer).unwrap();

    // Cover spans the original baseline at y = 800 in user space
    let covers = operands_of(&edited, "re");
    assert_eq!(covers.len(), 1);
    let cover = &covers[0];
    assert!(cover[1] < 800.0 && cover[1] + cover[3] > 806.0, "cover {:?}", cover);

    let moves = operands_of(&edited, "Td");
    assert_eq!(moves.last().unwrap(), &vec![100.0, 800.0]);

    let extracted = extract_text(&edited, &ContentStreamTextLayer).unwrap();
    let added = extracted
        .items
        .iter()
        .find(|item| item.text == "Public")
        .expect("replacement text present");
    assert_eq!((added.x, added.y), (original.items[0].x, original.items[0].y));
}

#[test]
fn unmatched_ids_are_ignored() {
    let source = create_synthetic_pdf(1, "Invoice");
    let replacements = vec![
        TextReplacement {
            id: "page-1-item-99".to_string(),
            new_text: "nope".to_string(),
        },
        TextReplacement {
            id: "page-7-item-0".to_string(),
            new_text: "nope".to_string(),
        },
        TextReplacement {
            id: "garbage".to_string(),
            new_text: "nope".to_string(),
        },
    ];

    let edited = replace_text(&source, &replacements, &ContentStreamTextLayer).unwrap();
    assert_eq!(page_contents(&edited), page_contents(&source));

    // No replacement font is left behind
    let fonts = |bytes: &[u8]| {
        Document::load_mem(bytes)
            .unwrap()
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .filter(|dict| dict.has(b"BaseFont"))
            .count()
    };
    assert_eq!(fonts(&edited), fonts(&source));
}

#[test]
fn watermark_text_is_extractable() {
    let source = create_synthetic_pdf(1, "Memo");
    let options = WatermarkOptions {
        text: "CONFIDENTIAL".to_string(),
        ..WatermarkOptions::default()
    };
    let marked = add_watermark(&source, &options).unwrap();

    let extracted = extract_text(&marked, &ContentStreamTextLayer).unwrap();
    let mark = extracted
        .items
        .iter()
        .find(|item| item.text == "CONFIDENTIAL")
        .expect("watermark text present");
    assert_eq!(mark.font_name.as_deref(), Some("Helvetica-Bold"));
    assert!((mark.font_size - 50.0).abs() < 1e-3);
    assert!(extracted.items.iter().any(|item| item.text == "Memo Page 1"));
}

/// Text layer fed with prepared runs, the way a browser host supplies them
struct PreparedLayer {
    pages: Vec<(f64, Vec<RawTextRun>)>,
}

struct PreparedDocument<'a> {
    layer: &'a PreparedLayer,
}

impl TextLayer for PreparedLayer {
    fn name(&self) -> &'static str {
        "prepared"
    }

    fn open<'a>(
        &'a self,
        _bytes: &'a [u8],
    ) -> Result<Box<dyn TextLayerDocument + 'a>, PdfToolkitError> {
        Ok(Box::new(PreparedDocument { layer: self }))
    }
}

impl TextLayerDocument for PreparedDocument<'_> {
    fn page_count(&self) -> u32 {
        self.layer.pages.len() as u32
    }

    fn viewport_height(&self, page: u32) -> Result<f64, PdfToolkitError> {
        Ok(self.layer.pages[page as usize - 1].0)
    }

    fn text_runs(&self, page: u32) -> Result<Vec<RawTextRun>, PdfToolkitError> {
        if page == 2 {
            return Err(PdfToolkitError::ExtractionError("corrupt page".into()));
        }
        Ok(self.layer.pages[page as usize - 1].1.clone())
    }
}

#[test]
fn unreadable_pages_are_skipped() {
    let run: RawTextRun = serde_json::from_str(
        r#"{"str":" Hello ","transform":[10,0,0,10,20,500],"width":25,"height":10}"#,
    )
    .unwrap();
    let blank: RawTextRun = serde_json::from_str(r#"{"str":"   "}"#).unwrap();
    let layer = PreparedLayer {
        pages: vec![
            (600.0, vec![blank.clone(), run.clone()]),
            (600.0, vec![run.clone()]),
            (800.0, vec![run]),
        ],
    };

    let extracted = extract_text(b"unused", &layer).unwrap();
    let ids: Vec<&str> = extracted.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["page-1-item-0", "page-3-item-0"]);
    assert_eq!(extracted.items[0].text, "Hello");
    assert_eq!(extracted.items[0].y, 100.0);
    assert_eq!(extracted.items[1].y, 300.0);
}
