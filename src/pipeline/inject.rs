//! Attach detected tables to the text pages they were found on.

use crate::error::ExtractError;
use crate::output::{
    EnrichedDocument, EnrichedPage, ElementKind, TableRecord, TextExtraction, VisualDetection,
};
use crate::pipeline::write_json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Table elements per page number. Pages without tables are absent.
pub fn extract_tables_from_visual(visual: &VisualDetection) -> BTreeMap<usize, Vec<TableRecord>> {
    let mut by_page = BTreeMap::new();
    for page in &visual.pages {
        let tables: Vec<TableRecord> = page
            .detection_result
            .elements
            .iter()
            .filter(|el| el.kind == ElementKind::Table)
            .map(|el| TableRecord {
                description: el.description.clone(),
                structured_data: el.content.structured_data.clone(),
                raw_text: el.content.raw_text.clone(),
                confidence: el.confidence,
                bbox: el.bbox.clone(),
            })
            .collect();
        if !tables.is_empty() {
            by_page.insert(page.page_number, tables);
        }
    }
    by_page
}

/// Copy `text` into an [`EnrichedDocument`], giving every page its tables.
///
/// Page text is left untouched; pages without tables get an empty list.
pub fn inject_tables_into_text(
    text: &TextExtraction,
    tables: &BTreeMap<usize, Vec<TableRecord>>,
) -> EnrichedDocument {
    let pages: Vec<EnrichedPage> = text
        .pages
        .iter()
        .map(|p| EnrichedPage {
            page_number: p.page_number,
            text: p.text.clone(),
            tables: tables.get(&p.page_number).cloned().unwrap_or_default(),
            original_text: None,
            text_cleaned: false,
        })
        .collect();

    let doc = EnrichedDocument {
        pdf_path: text.pdf_path.clone(),
        pdf_name: text.pdf_name.clone(),
        total_pages: text.total_pages,
        pages,
    };
    info!(
        "Injected {} tables across {} pages",
        doc.table_count(),
        doc.pages.iter().filter(|p| !p.tables.is_empty()).count()
    );
    doc
}

pub fn save_enriched_document(doc: &EnrichedDocument, path: &Path) -> Result<(), ExtractError> {
    write_json(doc, path)
}
