//! # pdf-visual-extract
//!
//! Extract text, tables and figures from PDF documents with Vision Language
//! Models (VLMs).
//!
//! ## Why this crate?
//!
//! A PDF text layer keeps the words of a financial table but loses its
//! structure: rows run together and numbers lose their labels. This crate
//! reads the text layer for the prose, rasterises each page and asks a VLM to
//! find the tables and figures, then merges both into artefacts that keep the
//! text intact and carry every table as structured data.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input   resolve local file or download from URL
//!  ├─ 2. Text    pdfium text layer per page
//!  ├─ 3. Render  rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 4. Detect  concurrent VLM calls, bounded pool, retries with backoff
//!  ├─ 5. Inject  detected tables attached to their text pages
//!  ├─ 6. Clean   optional LLM pass removing duplicated table text
//!  ├─ 7. Blend   paragraphs, tables and figures as one JSONL stream
//!  └─ 8. Export  Markdown report, CSV per table, PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_visual_extract::{run_pipeline, ExtractionConfig, PipelineOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::builder().max_pages(10).build()?;
//!     let report = run_pipeline(
//!         "annual_report.pdf",
//!         Path::new("output"),
//!         &PipelineOptions::all(),
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} tables on {} pages", report.tables_found, report.pages_processed);
//!     Ok(())
//! }
//! ```
//!
//! The steps are also usable on their own: [`extract_text_from_pdf`],
//! [`detect_visual_elements`], [`pipeline::inject`], [`pipeline::blend`] and
//! the [`export`] functions all read and write the same JSON artefacts.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-visual-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection, DEFAULT_MODEL};
pub use error::{ExtractError, PageError};
pub use extract::{
    detect_visual_elements, extract_text_from_pdf, inspect, pipeline_summary_markdown,
    render_page_images, resolve_provider, run_batch, run_pipeline, PipelineOptions,
};
pub use output::{
    BatchReport, BlendSummary, BlendedElement, DocumentInfo, EnrichedDocument, PipelineReport,
    TextExtraction, VisualDetection,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
