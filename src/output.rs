//! Data model for every artefact the pipeline reads and writes.
//!
//! Each stage persists its result as JSON (or JSONL for the blend) so stages
//! can be re-run individually from the CLI. Field names here are the on-disk
//! field names. Page numbers are 1-based throughout.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ── Text extraction ──────────────────────────────────────────────────────

/// Text layer of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    #[serde(default)]
    pub text: String,
    /// Set when the page's text layer could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of the text stage for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextExtraction {
    pub pdf_path: String,
    pub pdf_name: String,
    pub total_pages: usize,
    #[serde(default)]
    pub pages: Vec<PageText>,
    /// Page texts joined with a blank line.
    #[serde(default)]
    pub full_text: String,
}

impl TextExtraction {
    /// Join page texts the way `full_text` is defined.
    pub fn join_pages(pages: &[PageText]) -> String {
        pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Visual detection ─────────────────────────────────────────────────────

/// Kind of a detected visual element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    #[default]
    Table,
    Figure,
    #[serde(other)]
    Other,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Table => "table",
            ElementKind::Figure => "figure",
            ElementKind::Other => "other",
        }
    }
}

/// Payload of a detected element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementContent {
    /// Structured-list rendering (`### Table: …` / `- **Category**:` …).
    #[serde(default, deserialize_with = "string_or_null")]
    pub structured_data: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub raw_text: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub summary: String,
}

fn default_confidence() -> f64 {
    0.9
}

/// A table or figure found on a page image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualElement {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: ElementKind,
    /// `[x1, y1, x2, y2]` in image pixels, as reported by the model.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bbox: Vec<f64>,
    #[serde(default = "default_confidence", deserialize_with = "confidence_or_null")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "string_or_null")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: ElementContent,
}

/// Page-level verdict returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_tables: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_figures: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_elements: usize,
    #[serde(default, deserialize_with = "string_or_null")]
    pub page_summary: String,
}

/// Parsed model response for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_analysis: PageAnalysis,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elements: Vec<VisualElement>,
}

impl DetectionResult {
    /// An element-free result carrying only a page summary.
    pub fn empty(summary: impl Into<String>) -> Self {
        Self {
            page_analysis: PageAnalysis {
                page_summary: summary.into(),
                ..Default::default()
            },
            elements: Vec::new(),
        }
    }
}

/// One successfully detected page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualPage {
    pub page_number: usize,
    #[serde(default)]
    pub image_filename: String,
    pub detection_result: DetectionResult,
    /// RFC 3339 timestamp of when the response arrived.
    #[serde(default)]
    pub processing_timestamp: String,
    #[serde(default)]
    pub input_tokens: usize,
    #[serde(default)]
    pub output_tokens: usize,
    #[serde(default)]
    pub retries: u32,
}

/// Result of the detection stage for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualDetection {
    pub pdf_name: String,
    pub total_pages: usize,
    pub total_elements: usize,
    pub errors: usize,
    #[serde(default)]
    pub failed_pages: Vec<PageError>,
    /// Sorted ascending by `page_number`.
    #[serde(default)]
    pub pages: Vec<VisualPage>,
}

// ── Injection / cleaning ─────────────────────────────────────────────────

/// A detected table attached to a text page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub structured_data: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub bbox: Vec<f64>,
}

/// A text page enriched with its tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPage {
    pub page_number: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<TableRecord>,
    /// Pre-cleaning text, present only when the cleaner rewrote `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default)]
    pub text_cleaned: bool,
}

/// Text extraction with tables injected per page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    pub pdf_path: String,
    pub pdf_name: String,
    pub total_pages: usize,
    #[serde(default)]
    pub pages: Vec<EnrichedPage>,
}

impl EnrichedDocument {
    pub fn table_count(&self) -> usize {
        self.pages.iter().map(|p| p.tables.len()).sum()
    }
}

// ── Blend ────────────────────────────────────────────────────────────────

/// Element type in the blended stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendedKind {
    Text,
    Table,
    Figure,
}

impl BlendedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendedKind::Text => "text",
            BlendedKind::Table => "table",
            BlendedKind::Figure => "figure",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendedContent {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub confidence: f64,
    pub source: String,
    pub importance: String,
    pub category: String,
}

/// One line of the blended JSONL stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlendedKind,
    pub page: usize,
    pub content: BlendedContent,
    pub metadata: ElementMetadata,
}

/// Document-level notes derived from table descriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub total_elements: usize,
    #[serde(default)]
    pub key_metrics: Vec<String>,
    #[serde(default)]
    pub document_type: String,
}

/// Header line of the blended JSONL stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendSummary {
    pub pdf_name: String,
    pub total_elements: usize,
    #[serde(default)]
    pub document_summary: DocumentSummary,
    #[serde(default)]
    pub element_types: BTreeMap<String, usize>,
    #[serde(default)]
    pub categories: BTreeMap<String, usize>,
    #[serde(default)]
    pub importance_levels: BTreeMap<String, usize>,
    #[serde(default)]
    pub pages_covered: Vec<usize>,
}

// ── CSV export ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvFileRecord {
    pub page_number: usize,
    pub table_index: usize,
    pub description: String,
    pub csv_filename: String,
    pub csv_path: PathBuf,
    pub file_size: u64,
    /// False when the deterministic fallback produced the rows.
    pub model_converted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvExportSummary {
    pub pdf_name: String,
    pub total_tables: usize,
    pub converted_tables: usize,
    pub csv_files: Vec<CsvFileRecord>,
    pub errors: Vec<String>,
}

// ── Run reports ──────────────────────────────────────────────────────────

/// Paths and counts produced by one [`crate::extract::run_pipeline`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pdf_name: String,
    pub pdf_path: String,
    pub output_dir: PathBuf,
    pub pages_processed: usize,
    pub total_elements: usize,
    pub tables_found: usize,
    pub detection_errors: usize,
    pub text_file: PathBuf,
    pub visual_file: PathBuf,
    pub enriched_file: PathBuf,
    #[serde(default)]
    pub image_files: Vec<PathBuf>,
    pub blended_file: Option<PathBuf>,
    pub markdown_file: Option<PathBuf>,
    pub pdf_file: Option<PathBuf>,
    pub csv_summary: Option<CsvExportSummary>,
    pub summary_file: Option<PathBuf>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Outcome of [`crate::extract::run_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: Vec<PipelineReport>,
    /// `(pdf path, error message)` for every document that failed.
    pub failed: Vec<(PathBuf, String)>,
}

/// Document metadata returned by [`crate::extract::inspect`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
}

fn string_or_null<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Model replies send `null` where a field is unknown; treat it as absent.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn confidence_or_null<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(d)?.unwrap_or_else(default_confidence))
}
