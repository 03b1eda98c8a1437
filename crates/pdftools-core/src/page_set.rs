//! Page-set operations
//!
//! Merge, split, extract, remove and reorder all build a new document from
//! a selected and ordered subset of source pages. Page numbers are 1-based;
//! numbers outside `[1, page_count]` are dropped from every selection and
//! only an empty surviving selection is an error.

use crate::document::{self, DocumentBuilder};
use crate::error::{PdfToolkitError, Result, ValidationError};
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inclusive 1-based page range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Pages of this range that exist in a document of `page_count` pages
    pub fn clamp(&self, page_count: u32) -> std::ops::RangeInclusive<u32> {
        self.start.max(1)..=self.end.min(page_count)
    }
}

/// How a document is split into several outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "lowercase")]
pub enum SplitOptions {
    /// One single-page document per listed page
    Pages { pages: Vec<u32> },
    /// One document per range
    Ranges { ranges: Vec<PageRange> },
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions::Pages { pages: Vec::new() }
    }
}

fn is_valid_page(page: u32, page_count: u32) -> bool {
    page >= 1 && page <= page_count
}

/// Build and serialize a document holding `pages` of `source` in order
fn build_selection(source: &Document, pages: &[u32]) -> Result<Vec<u8>> {
    let mut builder = DocumentBuilder::new();
    let imported = builder.import(source.clone());

    for &page in pages {
        if let Some(page_id) = imported.get(page) {
            builder.push_page(page_id)?;
        }
    }

    let mut doc = builder.finish(None);
    document::save(&mut doc)
}

/// Concatenate every page of every input, in input order
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    if documents.is_empty() {
        return Err(ValidationError::NoDocuments.into());
    }

    debug!(documents = documents.len(), "merging documents");

    let mut builder = DocumentBuilder::new();
    for (i, bytes) in documents.iter().enumerate() {
        let source = Document::load_mem(bytes).map_err(|e| {
            PdfToolkitError::ParseError(format!("Failed to load document {}: {}", i, e))
        })?;

        let imported = builder.import(source);
        for &page_id in imported.ids() {
            builder.push_page(page_id)?;
        }
    }

    let page_count = builder.page_count();
    let mut merged = builder.finish(None);
    merged.compress();

    debug!(page_count, "merge complete");
    document::save(&mut merged)
}

/// Split into several documents.
///
/// Outputs that would contain no valid page are not produced, so the result
/// may be empty.
pub fn split_document(bytes: &[u8], options: &SplitOptions) -> Result<Vec<Vec<u8>>> {
    let source = document::load(bytes)?;
    let page_count = source.get_pages().len() as u32;

    let selections: Vec<Vec<u32>> = match options {
        SplitOptions::Pages { pages } => pages
            .iter()
            .filter(|&&page| is_valid_page(page, page_count))
            .map(|&page| vec![page])
            .collect(),
        SplitOptions::Ranges { ranges } => ranges
            .iter()
            .map(|range| range.clamp(page_count).collect::<Vec<u32>>())
            .filter(|pages| !pages.is_empty())
            .collect(),
    };

    debug!(page_count, outputs = selections.len(), "splitting document");

    selections
        .iter()
        .map(|pages| build_selection(&source, pages))
        .collect()
}

/// Keep only the requested pages, in ascending page order. Repeated
/// numbers repeat the page.
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
    let source = document::load(bytes)?;
    let page_count = source.get_pages().len() as u32;

    let mut selected: Vec<u32> = pages
        .iter()
        .copied()
        .filter(|&page| is_valid_page(page, page_count))
        .collect();
    selected.sort_unstable();

    if selected.is_empty() {
        return Err(ValidationError::NoValidPages.into());
    }

    debug!(page_count, extracted = selected.len(), "extracting pages");
    build_selection(&source, &selected)
}

/// Delete the requested pages, keeping everything else in place
pub fn remove_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
    let mut doc = document::load(bytes)?;
    let page_count = doc.get_pages().len() as u32;

    let mut to_remove: Vec<u32> = pages
        .iter()
        .copied()
        .filter(|&page| is_valid_page(page, page_count))
        .collect();
    to_remove.sort_unstable();
    to_remove.dedup();

    if to_remove.is_empty() {
        return Err(ValidationError::NoValidPages.into());
    }
    if to_remove.len() as u32 == page_count {
        return Err(ValidationError::RemovesAllPages.into());
    }

    debug!(page_count, removed = to_remove.len(), "removing pages");

    // Highest first so earlier page numbers stay valid
    for &page in to_remove.iter().rev() {
        doc.delete_pages(&[page]);
    }

    doc.prune_objects();
    document::save(&mut doc)
}

/// Rebuild the page sequence exactly as listed.
///
/// Repeated pages are duplicated and omitted pages are dropped.
pub fn reorder_pages(bytes: &[u8], page_order: &[u32]) -> Result<Vec<u8>> {
    let source = document::load(bytes)?;
    let page_count = source.get_pages().len() as u32;

    let order: Vec<u32> = page_order
        .iter()
        .copied()
        .filter(|&page| is_valid_page(page, page_count))
        .collect();

    if order.is_empty() {
        return Err(ValidationError::InvalidPageOrder.into());
    }

    debug!(page_count, output_pages = order.len(), "reordering pages");
    build_selection(&source, &order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_pdf, page_contents, page_count};
    use pretty_assertions::assert_eq;

    fn assert_validation(result: Result<Vec<u8>>, expected: ValidationError) {
        match result {
            Err(PdfToolkitError::Validation(err)) => assert_eq!(err, expected),
            other => panic!("expected {:?}, got {:?}", expected, other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_merge_two_documents() {
        let merged = merge_documents(vec![create_test_pdf(1), create_test_pdf(2)]).unwrap();
        let contents = page_contents(&merged);
        assert_eq!(contents.len(), 3);
        assert!(contents[0].contains("Page 1"));
        assert!(contents[1].contains("Page 1"));
        assert!(contents[2].contains("Page 2"));
    }

    #[test]
    fn test_merge_single_document_keeps_page_count() {
        let merged = merge_documents(vec![create_test_pdf(4)]).unwrap();
        assert_eq!(page_count(&merged), 4);
    }

    #[test]
    fn test_merge_empty_fails() {
        assert_validation(merge_documents(vec![]), ValidationError::NoDocuments);
    }

    #[test]
    fn test_merge_invalid_pdf_fails() {
        let result = merge_documents(vec![create_test_pdf(1), b"not a pdf".to_vec()]);
        assert!(matches!(result, Err(PdfToolkitError::ParseError(_))));
    }

    #[test]
    fn test_split_by_pages() {
        let outputs = split_document(
            &create_test_pdf(3),
            &SplitOptions::Pages { pages: vec![3, 9, 1] },
        )
        .unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(page_contents(&outputs[0])[0].contains("Page 3"));
        assert!(page_contents(&outputs[1])[0].contains("Page 1"));
    }

    #[test]
    fn test_split_by_ranges() {
        let outputs = split_document(
            &create_test_pdf(3),
            &SplitOptions::Ranges {
                ranges: vec![PageRange { start: 1, end: 2 }, PageRange { start: 3, end: 3 }],
            },
        )
        .unwrap();
        assert_eq!(outputs.iter().map(|o| page_count(o)).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_split_range_clamped_and_empty_skipped() {
        let outputs = split_document(
            &create_test_pdf(3),
            &SplitOptions::Ranges {
                ranges: vec![PageRange { start: 0, end: 10 }, PageRange { start: 5, end: 8 }],
            },
        )
        .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(page_count(&outputs[0]), 3);
    }

    #[test]
    fn test_split_nothing_valid_returns_empty_list() {
        let outputs =
            split_document(&create_test_pdf(2), &SplitOptions::Pages { pages: vec![7] }).unwrap();
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_extract_sorts_and_keeps_repeats() {
        let extracted = extract_pages(&create_test_pdf(5), &[4, 2, 4, 99]).unwrap();
        let contents = page_contents(&extracted);
        assert_eq!(contents.len(), 3);
        assert!(contents[0].contains("Page 2"));
        assert!(contents[1].contains("Page 4"));
        assert!(contents[2].contains("Page 4"));
    }

    #[test]
    fn test_extract_out_of_range_fails() {
        assert_validation(
            extract_pages(&create_test_pdf(5), &[10, 11]),
            ValidationError::NoValidPages,
        );
    }

    #[test]
    fn test_remove_pages() {
        let result = remove_pages(&create_test_pdf(4), &[4, 2, 2]).unwrap();
        let contents = page_contents(&result);
        assert_eq!(contents.len(), 2);
        assert!(contents[0].contains("Page 1"));
        assert!(contents[1].contains("Page 3"));
    }

    #[test]
    fn test_remove_all_pages_fails() {
        assert_validation(
            remove_pages(&create_test_pdf(3), &[1, 2, 3]),
            ValidationError::RemovesAllPages,
        );
    }

    #[test]
    fn test_remove_nothing_valid_fails() {
        assert_validation(remove_pages(&create_test_pdf(3), &[0, 4]), ValidationError::NoValidPages);
    }

    #[test]
    fn test_reorder_pages() {
        let result = reorder_pages(&create_test_pdf(3), &[3, 1, 2]).unwrap();
        let contents = page_contents(&result);
        assert!(contents[0].contains("Page 3"));
        assert!(contents[1].contains("Page 1"));
        assert!(contents[2].contains("Page 2"));
    }

    #[test]
    fn test_reorder_allows_duplicates_and_omissions() {
        let result = reorder_pages(&create_test_pdf(3), &[2, 2, 7]).unwrap();
        let contents = page_contents(&result);
        assert_eq!(contents.len(), 2);
        assert!(contents.iter().all(|c| c.contains("Page 2")));
    }

    #[test]
    fn test_reorder_invalid_order_fails() {
        assert_validation(
            reorder_pages(&create_test_pdf(3), &[10, 20]),
            ValidationError::InvalidPageOrder,
        );
    }
}
