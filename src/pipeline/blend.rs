//! Text-preserving blend of the text layer and detected elements.
//!
//! The text is kept verbatim, split into paragraphs, and every table and
//! figure becomes a separate element next to it. The result is written as
//! JSONL: one summary line, then one element per line.

use crate::error::ExtractError;
use crate::output::{
    BlendSummary, BlendedContent, BlendedElement, BlendedKind, DocumentSummary, ElementKind,
    ElementMetadata, EnrichedDocument, TextExtraction, VisualDetection,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

const SUMMARY_CHARS: usize = 200;

/// Blend the pages of a text extraction with detected elements.
pub fn blend_text_extraction(
    text: &TextExtraction,
    visual: &VisualDetection,
    min_confidence: f64,
) -> (Vec<BlendedElement>, BlendSummary) {
    let pages = text.pages.iter().map(|p| (p.page_number, p.text.as_str()));
    blend(&text.pdf_name, pages, visual, min_confidence)
}

/// Blend an enriched (possibly cleaned) document with detected elements.
pub fn blend_enriched(
    doc: &EnrichedDocument,
    visual: &VisualDetection,
    min_confidence: f64,
) -> (Vec<BlendedElement>, BlendSummary) {
    let pages = doc.pages.iter().map(|p| (p.page_number, p.text.as_str()));
    blend(&doc.pdf_name, pages, visual, min_confidence)
}

fn blend<'a>(
    pdf_name: &str,
    pages: impl Iterator<Item = (usize, &'a str)>,
    visual: &VisualDetection,
    min_confidence: f64,
) -> (Vec<BlendedElement>, BlendSummary) {
    let mut elements = text_elements(pages);
    elements.extend(visual_elements(visual, ElementKind::Table, min_confidence));
    elements.extend(visual_elements(visual, ElementKind::Figure, min_confidence));

    let summary = summarize(pdf_name, &elements);
    info!(
        "Blended {} elements ({:?})",
        summary.total_elements, summary.element_types
    );
    (elements, summary)
}

fn text_elements<'a>(pages: impl Iterator<Item = (usize, &'a str)>) -> Vec<BlendedElement> {
    let mut out = Vec::new();
    for (page, text) in pages {
        let paragraphs = text.split("\n\n").map(str::trim).filter(|p| !p.is_empty());
        for (i, para) in paragraphs.enumerate() {
            out.push(BlendedElement {
                id: format!("text_page_{}_para_{}", page, i + 1),
                kind: BlendedKind::Text,
                page,
                content: BlendedContent {
                    text: para.to_string(),
                    structured_data: None,
                    raw_text: None,
                    context: format!("Original text content from page {}", page),
                    summary: summarize_paragraph(para),
                },
                metadata: ElementMetadata {
                    confidence: 1.0,
                    source: "text".into(),
                    importance: "medium".into(),
                    category: "narrative".into(),
                },
            });
        }
    }
    out
}

fn summarize_paragraph(para: &str) -> String {
    match para.char_indices().nth(SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &para[..cut]),
        None => para.to_string(),
    }
}

fn visual_elements(
    visual: &VisualDetection,
    kind: ElementKind,
    min_confidence: f64,
) -> Vec<BlendedElement> {
    let (blended, id_part, label, category) = match kind {
        ElementKind::Table => (BlendedKind::Table, "table", "Table", "financial_metrics"),
        ElementKind::Figure => (BlendedKind::Figure, "fig", "Figure", "visual_data"),
        ElementKind::Other => return Vec::new(),
    };

    let mut out = Vec::new();
    for page in &visual.pages {
        let p = page.page_number;
        for (i, el) in page.detection_result.elements.iter().enumerate() {
            if el.kind != kind || el.confidence <= min_confidence {
                continue;
            }
            out.push(BlendedElement {
                id: format!("{}_page_{}_{}_{}", blended.as_str(), p, id_part, i + 1),
                kind: blended,
                page: p,
                content: BlendedContent {
                    text: el.description.clone(),
                    structured_data: Some(el.content.structured_data.clone()),
                    raw_text: Some(el.content.raw_text.clone()),
                    context: format!("{} detected on page {}", label, p),
                    summary: el.content.summary.clone(),
                },
                metadata: ElementMetadata {
                    confidence: el.confidence,
                    source: "visual".into(),
                    importance: "high".into(),
                    category: category.into(),
                },
            });
        }
    }
    out
}

/// Count element types, categories and importance levels.
pub fn summarize(pdf_name: &str, elements: &[BlendedElement]) -> BlendSummary {
    let mut summary = BlendSummary {
        pdf_name: pdf_name.to_string(),
        total_elements: elements.len(),
        ..Default::default()
    };
    let mut pages = BTreeSet::new();
    let mut key_metrics: Vec<String> = Vec::new();

    for el in elements {
        *summary
            .element_types
            .entry(el.kind.as_str().to_string())
            .or_default() += 1;
        *summary
            .categories
            .entry(el.metadata.category.clone())
            .or_default() += 1;
        *summary
            .importance_levels
            .entry(el.metadata.importance.clone())
            .or_default() += 1;
        pages.insert(el.page);

        if el.kind == BlendedKind::Table {
            let desc = el.content.text.to_lowercase();
            for (needle, metric) in [
                ("revenue", "Revenue data available"),
                ("income", "Income data available"),
            ] {
                if desc.contains(needle) && !key_metrics.iter().any(|m| m == metric) {
                    key_metrics.push(metric.to_string());
                }
            }
        }
    }

    let has_tables = summary.element_types.contains_key("table");
    summary.pages_covered = pages.into_iter().collect();
    summary.document_summary = DocumentSummary {
        total_elements: elements.len(),
        key_metrics,
        document_type: if has_tables {
            "financial_report".into()
        } else {
            "document".into()
        },
    };
    summary
}

#[derive(Serialize, Deserialize)]
struct SummaryLine {
    summary: BlendSummary,
}

/// Write the summary line followed by one element per line.
pub fn save_blended_jsonl(
    elements: &[BlendedElement],
    summary: &BlendSummary,
    path: &Path,
) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ExtractError::write(parent))?;
    }
    let file = std::fs::File::create(path).map_err(ExtractError::write(path))?;
    let mut w = BufWriter::new(file);

    let line = serde_json::to_string(&SummaryLine {
        summary: summary.clone(),
    })
    .map_err(ExtractError::json(path.display().to_string()))?;
    writeln!(w, "{}", line).map_err(ExtractError::write(path))?;

    for el in elements {
        let line =
            serde_json::to_string(el).map_err(ExtractError::json(path.display().to_string()))?;
        writeln!(w, "{}", line).map_err(ExtractError::write(path))?;
    }
    w.flush().map_err(ExtractError::write(path))
}

/// Read a blended JSONL file. Blank lines are skipped; the summary line is optional.
pub fn load_blended_jsonl(
    path: &Path,
) -> Result<(Option<BlendSummary>, Vec<BlendedElement>), ExtractError> {
    let file = std::fs::File::open(path).map_err(ExtractError::read(path))?;
    let mut summary = None;
    let mut elements = Vec::new();

    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(ExtractError::read(path))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if summary.is_none() && elements.is_empty() {
            if let Ok(s) = serde_json::from_str::<SummaryLine>(line) {
                summary = Some(s.summary);
                continue;
            }
        }
        let context = format!("{}:{}", path.display(), n + 1);
        elements.push(serde_json::from_str(line).map_err(ExtractError::json(context))?);
    }
    Ok((summary, elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{DetectionResult, ElementContent, PageText, VisualElement, VisualPage};
    use pretty_assertions::assert_eq;

    fn el(kind: ElementKind, desc: &str, confidence: f64) -> VisualElement {
        VisualElement {
            kind,
            bbox: vec![],
            confidence,
            description: desc.into(),
            content: ElementContent {
                structured_data: "### Table: X".into(),
                raw_text: "raw".into(),
                summary: "sum".into(),
            },
        }
    }

    fn inputs() -> (TextExtraction, VisualDetection) {
        let text = TextExtraction {
            pdf_path: "q3.pdf".into(),
            pdf_name: "q3".into(),
            total_pages: 2,
            pages: vec![
                PageText {
                    page_number: 1,
                    text: "First para.\n\n  \n\nSecond para.".into(),
                    error: None,
                },
                PageText {
                    page_number: 2,
                    text: "Only para".into(),
                    error: None,
                },
            ],
            full_text: String::new(),
        };
        let visual = VisualDetection {
            pdf_name: "q3".into(),
            total_pages: 2,
            pages: vec![VisualPage {
                page_number: 2,
                detection_result: DetectionResult {
                    elements: vec![
                        el(ElementKind::Figure, "Trend chart", 0.9),
                        el(ElementKind::Table, "Revenue by segment", 0.95),
                        el(ElementKind::Table, "Noise", 0.3),
                    ],
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        (text, visual)
    }

    #[test]
    fn blend_orders_text_then_tables_then_figures() {
        let (text, visual) = inputs();
        let (elements, summary) = blend_text_extraction(&text, &visual, 0.3);

        let ids: Vec<_> = elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "text_page_1_para_1",
                "text_page_1_para_2",
                "text_page_2_para_1",
                "table_page_2_table_2",
                "figure_page_2_fig_1",
            ]
        );
        assert_eq!(summary.total_elements, 5);
        assert_eq!(summary.element_types["text"], 3);
        assert_eq!(summary.categories["financial_metrics"], 1);
        assert_eq!(summary.importance_levels["high"], 2);
        assert_eq!(summary.pages_covered, vec![1, 2]);
        assert_eq!(
            summary.document_summary.key_metrics,
            vec!["Revenue data available".to_string()]
        );
    }

    #[test]
    fn visual_metadata_is_copied() {
        let (text, visual) = inputs();
        let (elements, _) = blend_text_extraction(&text, &visual, 0.3);
        let table = &elements[3];
        assert_eq!(table.content.text, "Revenue by segment");
        assert_eq!(table.content.structured_data.as_deref(), Some("### Table: X"));
        assert_eq!(table.metadata.confidence, 0.95);
        assert_eq!(table.metadata.source, "visual");
    }

    #[test]
    fn long_paragraph_summary_is_cut() {
        let para = "a".repeat(250);
        let s = summarize_paragraph(&para);
        assert_eq!(s.len(), 203);
        assert!(s.ends_with("..."));
        assert_eq!(summarize_paragraph("short"), "short");
    }

    #[test]
    fn jsonl_round_trip() {
        let (text, visual) = inputs();
        let (elements, summary) = blend_text_extraction(&text, &visual, 0.3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/q3_blended_elements.jsonl");

        save_blended_jsonl(&elements, &summary, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("{\"summary\":"));
        assert_eq!(raw.lines().count(), 6);

        let (loaded_summary, loaded) = load_blended_jsonl(&path).unwrap();
        assert_eq!(loaded_summary, Some(summary));
        assert_eq!(loaded, elements);
    }

    #[test]
    fn load_without_summary_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jsonl");
        let line = r#"{"id":"text_page_1_para_1","type":"text","page":1,"content":{"text":"hi"},"metadata":{"confidence":1.0,"source":"text","importance":"medium","category":"narrative"}}"#;
        std::fs::write(&path, format!("\n{line}\n\n")).unwrap();

        let (summary, elements) = load_blended_jsonl(&path).unwrap();
        assert!(summary.is_none());
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].content.text, "hi");
    }
}
