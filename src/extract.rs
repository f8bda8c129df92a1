//! Top-level entry points: single steps, the full pipeline and batch runs.
//!
//! Every function here resolves its input (local path or URL), selects pages
//! from the config, and delegates to [`crate::pipeline`] and
//! [`crate::export`]. Only fatal problems become `Err`; page-level failures
//! are recorded in the returned artefacts.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::export::{csv, markdown, pdf};
use crate::output::{BatchReport, DocumentInfo, PipelineReport, TextExtraction, VisualDetection};
use crate::pipeline::{blend, clean, detect, encode, inject, input, render, text};
use edgequake_llm::{LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which optional stages [`run_pipeline`] performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Write `exports/{name}_report.md`.
    pub export_md: bool,
    /// Write `exports/{name}_report.pdf`.
    pub export_pdf: bool,
    /// Write one CSV per table under `exports/csv_exports/`.
    pub export_csv: bool,
    /// Write `blended_output/{name}_blended_elements.jsonl`.
    pub blend: bool,
}

impl PipelineOptions {
    /// Every optional stage enabled.
    pub fn all() -> Self {
        Self {
            export_md: true,
            export_pdf: true,
            export_csv: true,
            blend: true,
        }
    }
}

/// Output directories of one document.
struct RunDirs {
    base: PathBuf,
    images: PathBuf,
    text: PathBuf,
    visual: PathBuf,
    blended: PathBuf,
    exports: PathBuf,
}

impl RunDirs {
    fn new(output_dir: &Path, pdf_name: &str) -> Self {
        let base = output_dir.join(pdf_name);
        Self {
            images: base.join("images"),
            text: base.join("text_extraction"),
            visual: base.join("visual_detection"),
            blended: base.join("blended_output"),
            exports: base.join("exports"),
            base,
        }
    }

    fn create(&self) -> Result<(), ExtractError> {
        for dir in [
            &self.base,
            &self.images,
            &self.text,
            &self.visual,
            &self.blended,
            &self.exports,
        ] {
            std::fs::create_dir_all(dir).map_err(ExtractError::write(dir))?;
        }
        Ok(())
    }
}

/// Extract the text layer of the selected pages.
///
/// Does not require an LLM provider.
pub async fn extract_text_from_pdf(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<TextExtraction, ExtractError> {
    let input_str = input_str.as_ref();
    input::require_pdf_extension(input_str)?;
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path();

    let indices = select_pages(pdf_path, config).await?;
    text::extract_text(pdf_path, config.password.as_deref(), &indices).await
}

/// Render the selected pages and run table/figure detection on them.
///
/// Pages that fail to render or encode are reported in `failed_pages`
/// alongside pages whose model call failed.
pub async fn detect_visual_elements(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<VisualDetection, ExtractError> {
    let input_str = input_str.as_ref();
    input::require_pdf_extension(input_str)?;
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let provider = resolve_provider(config)?;

    let indices = select_pages(resolved.path(), config).await?;
    let (detection, _) =
        render_and_detect(&provider, resolved.path(), &resolved.pdf_name(), &indices, config)
            .await?;
    Ok(detection)
}

/// Render the selected pages to `dir` as `page_NNN.png`.
///
/// Pages that fail to render are logged and skipped.
pub async fn render_page_images(
    input_str: impl AsRef<str>,
    dir: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>, ExtractError> {
    let input_str = input_str.as_ref();
    input::require_pdf_extension(input_str)?;
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    let indices = select_pages(resolved.path(), config).await?;
    let rendered = render::render_pages(resolved.path(), config, &indices).await?;
    for failure in &rendered.failures {
        warn!("{}", failure);
    }
    render::save_page_images(&rendered.images, dir).await
}

/// Extract PDF metadata without rendering or calling a model.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, ExtractError> {
    let input_str = input_str.as_ref();
    input::require_pdf_extension(input_str)?;
    let resolved = input::resolve_input(input_str, 120).await?;
    render::extract_metadata(resolved.path(), None).await
}

/// Run the complete pipeline for one document.
///
/// Artefacts are written below `<output_dir>/<pdf_name>/`:
///
/// ```text
/// images/page_NNN.png
/// text_extraction/{name}_text.json
/// text_extraction/{name}_with_tables.json
/// visual_detection/{name}_tables_figures.json
/// blended_output/{name}_blended_elements.jsonl   (options.blend)
/// exports/{name}_report.md | .pdf                (options.export_md / export_pdf)
/// exports/csv_exports/*.csv                      (options.export_csv)
/// {name}_pipeline_summary.md
/// ```
///
/// # Errors
/// Fatal input, provider and I/O errors, and [`ExtractError::AllPagesFailed`]
/// when no selected page produced a detection result.
pub async fn run_pipeline(
    input_str: impl AsRef<str>,
    output_dir: &Path,
    options: &PipelineOptions,
    config: &ExtractionConfig,
) -> Result<PipelineReport, ExtractError> {
    let start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting pipeline: {}", input_str);

    // ── Step 1: Resolve input and provider ───────────────────────────────
    input::require_pdf_extension(input_str)?;
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();
    let pdf_name = resolved.pdf_name();
    let provider = resolve_provider(config)?;

    let dirs = RunDirs::new(output_dir, &pdf_name);
    dirs.create()?;
    info!("Output: {}", dirs.base.display());

    let indices = select_pages(&pdf_path, config).await?;

    let mut report = PipelineReport {
        pdf_name: pdf_name.clone(),
        pdf_path: pdf_path.display().to_string(),
        output_dir: dirs.base.clone(),
        ..Default::default()
    };

    // ── Step 2: Text layer ───────────────────────────────────────────────
    let text = text::extract_text(&pdf_path, config.password.as_deref(), &indices).await?;
    report.text_file = dirs.text.join(format!("{}_text.json", pdf_name));
    text::save_text_extraction(&text, &report.text_file)?;

    // ── Step 3: Render + detect ──────────────────────────────────────────
    let (detection, images) =
        render_and_detect(&provider, &pdf_path, &pdf_name, &indices, config).await?;
    if config.save_images {
        report.image_files = render::save_page_images(&images, &dirs.images).await?;
    }
    drop(images);

    report.visual_file = dirs.visual.join(format!("{}_tables_figures.json", pdf_name));
    detect::save_visual_detection(&detection, &report.visual_file)?;

    if detection.pages.is_empty() {
        let first_error = detection
            .failed_pages
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(ExtractError::AllPagesFailed {
            total: indices.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    report.pages_processed = detection.pages.len();
    report.total_elements = detection.total_elements;
    report.detection_errors = detection.errors;
    report.input_tokens = detection.pages.iter().map(|p| p.input_tokens).sum();
    report.output_tokens = detection.pages.iter().map(|p| p.output_tokens).sum();

    // ── Step 4: Inject tables, optionally clean ──────────────────────────
    let tables = inject::extract_tables_from_visual(&detection);
    let mut enriched = inject::inject_tables_into_text(&text, &tables);
    if config.clean_text {
        enriched = clean::clean_document(&provider, &enriched, Some(&detection), config).await;
    }
    report.tables_found = enriched.table_count();
    report.enriched_file = dirs.text.join(format!("{}_with_tables.json", pdf_name));
    inject::save_enriched_document(&enriched, &report.enriched_file)?;

    // ── Step 5: Blend ────────────────────────────────────────────────────
    if options.blend {
        let (elements, summary) = blend::blend_enriched(&enriched, &detection, config.min_confidence);
        let path = dirs.blended.join(format!("{}_blended_elements.jsonl", pdf_name));
        blend::save_blended_jsonl(&elements, &summary, &path)?;
        report.blended_file = Some(path);
    }

    // ── Step 6: Exports ──────────────────────────────────────────────────
    if options.export_md || options.export_pdf {
        let md = markdown::document_to_markdown(&enriched);
        if options.export_md {
            let path = dirs.exports.join(format!("{}_report.md", pdf_name));
            write_file(&path, md.as_bytes()).await?;
            report.markdown_file = Some(path);
        }
        if options.export_pdf {
            let bytes = pdf::markdown_to_pdf(&md, &markdown::display_title(&pdf_name))?;
            let path = dirs.exports.join(format!("{}_report.pdf", pdf_name));
            write_file(&path, &bytes).await?;
            report.pdf_file = Some(path);
        }
    }

    if options.export_csv {
        let summary =
            csv::convert_tables_to_csv(Some(&provider), &enriched, &dirs.exports, &pdf_name, config)
                .await?;
        report.csv_summary = Some(summary);
    }

    // ── Step 7: Summary ──────────────────────────────────────────────────
    report.duration_ms = start.elapsed().as_millis() as u64;
    let summary_path = dirs.base.join(format!("{}_pipeline_summary.md", pdf_name));
    report.summary_file = Some(summary_path.clone());
    write_file(&summary_path, pipeline_summary_markdown(&report).as_bytes()).await?;

    info!(
        "Pipeline complete for {}: {} pages, {} elements, {} tables in {}ms",
        pdf_name, report.pages_processed, report.total_elements, report.tables_found, report.duration_ms
    );
    Ok(report)
}

/// Run [`run_pipeline`] on every `*.pdf` in `data_dir`, in file-name order.
///
/// A document that fails is logged and recorded in [`BatchReport::failed`];
/// the batch carries on with the next one.
pub async fn run_batch(
    data_dir: &Path,
    output_dir: &Path,
    options: &PipelineOptions,
    config: &ExtractionConfig,
    max_pdfs: Option<usize>,
) -> Result<BatchReport, ExtractError> {
    let pdfs = list_pdfs(data_dir, max_pdfs)?;
    let mut batch = BatchReport::default();
    if pdfs.is_empty() {
        warn!("No PDF files found in {}", data_dir.display());
        return Ok(batch);
    }
    info!("Processing {} PDFs from {}", pdfs.len(), data_dir.display());

    for (i, pdf) in pdfs.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, pdfs.len(), pdf.display());
        match run_pipeline(pdf.to_string_lossy(), output_dir, options, config).await {
            Ok(report) => batch.processed.push(report),
            Err(e) => {
                warn!("Failed to process {}: {}", pdf.display(), e);
                batch.failed.push((pdf.clone(), e.to_string()));
            }
        }
    }

    info!(
        "Batch complete: {} succeeded, {} failed",
        batch.processed.len(),
        batch.failed.len()
    );
    Ok(batch)
}

/// `*.pdf` files (any case) directly inside `dir`, sorted, first `max` only.
pub fn list_pdfs(dir: &Path, max: Option<usize>) -> Result<Vec<PathBuf>, ExtractError> {
    if !dir.is_dir() {
        return Err(ExtractError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let pattern = format!(
        "{}/*.pdf",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let mut pdfs: Vec<PathBuf> = glob::glob_with(&pattern, options)
        .map_err(|e| ExtractError::Internal(format!("Invalid glob pattern: {}", e)))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    pdfs.sort();
    if let Some(max) = max {
        pdfs.truncate(max);
    }
    Ok(pdfs)
}

/// Markdown summary of one pipeline run.
pub fn pipeline_summary_markdown(report: &PipelineReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# PDF Visual Extraction Pipeline Summary\n");
    let _ = writeln!(md, "**Document**: {}", report.pdf_name);
    let _ = writeln!(md, "**Source**: `{}`", report.pdf_path);
    let _ = writeln!(
        md,
        "**Processing Date**: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(md, "**Pages Processed**: {}", report.pages_processed);
    let _ = writeln!(md, "**Elements Detected**: {}", report.total_elements);
    let _ = writeln!(md, "**Tables Found**: {}", report.tables_found);
    if report.detection_errors > 0 {
        let _ = writeln!(md, "**Pages Failed**: {}", report.detection_errors);
    }
    let _ = writeln!(
        md,
        "**Tokens**: {} in / {} out",
        report.input_tokens, report.output_tokens
    );
    let _ = writeln!(md, "**Duration**: {:.1}s\n", report.duration_ms as f64 / 1000.0);

    md.push_str("## Generated Files\n\n");
    md.push_str("### Text Extraction\n");
    let _ = writeln!(md, "- `{}` (Original text)", report.text_file.display());
    let _ = writeln!(md, "- `{}` (Text with tables injected)\n", report.enriched_file.display());

    if !report.image_files.is_empty() {
        md.push_str("### Images\n");
        let dir = report.image_files[0]
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let _ = writeln!(md, "- `{}/` ({} PNG files)\n", dir, report.image_files.len());
    }

    md.push_str("### Visual Detection\n");
    let _ = writeln!(md, "- `{}`\n", report.visual_file.display());

    if let Some(ref path) = report.blended_file {
        md.push_str("### Blended Output\n");
        let _ = writeln!(md, "- `{}`\n", path.display());
    }

    let exports: Vec<(&PathBuf, &str)> = [
        (report.markdown_file.as_ref(), "Markdown report"),
        (report.pdf_file.as_ref(), "PDF report"),
    ]
    .into_iter()
    .filter_map(|(p, label)| p.map(|p| (p, label)))
    .collect();
    if !exports.is_empty() || report.csv_summary.is_some() {
        md.push_str("### Exports\n");
        for (path, label) in exports {
            let _ = writeln!(md, "- `{}` ({})", path.display(), label);
        }
        if let Some(ref csv) = report.csv_summary {
            for file in &csv.csv_files {
                let _ = writeln!(md, "- `{}` (CSV, page {})", file.csv_path.display(), file.page_number);
            }
            if !csv.errors.is_empty() {
                let _ = writeln!(md, "- {} CSV conversion errors", csv.errors.len());
            }
        }
        md.push('\n');
    }

    md.push_str("## Usage\n\n");
    let _ = writeln!(
        md,
        "For RAG systems use `{}`. Each page carries its `text` and a `tables` array; \
         each table has `description`, `structured_data`, `raw_text`, `confidence` and `bbox`.",
        report.enriched_file.display()
    );
    md
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the LLM provider, from most to least specific.
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (default `gpt-4o-mini`).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. `openai` when `OPENAI_API_KEY` is set.
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_name());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", config.model_name());
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    debug!("Creating provider {} with model {}", name, model);
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// 0-based indices of the pages to process.
async fn select_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<usize>, ExtractError> {
    let info = render::extract_metadata(pdf_path, config.password.as_deref()).await?;
    let indices = config.page_indices(info.page_count);
    if indices.is_empty() {
        return Err(ExtractError::NoPagesSelected {
            total: info.page_count,
        });
    }
    info!(
        "Selected {} of {} pages",
        indices.len(),
        info.page_count
    );
    Ok(indices)
}

/// Render, encode and detect the pages at `indices`.
///
/// Render and encode failures are merged into the detection's failed pages.
/// The rendered images are returned so the caller can save them.
async fn render_and_detect(
    provider: &Arc<dyn LLMProvider>,
    pdf_path: &Path,
    pdf_name: &str,
    indices: &[usize],
    config: &ExtractionConfig,
) -> Result<(VisualDetection, Vec<(usize, DynamicImage)>), ExtractError> {
    let rendered = render::render_pages(pdf_path, config, indices).await?;
    info!("Rendered {} pages", rendered.images.len());

    let mut failures = rendered.failures;
    let mut encoded = Vec::with_capacity(rendered.images.len());
    for (idx, image) in &rendered.images {
        match encode::encode_page(idx + 1, image) {
            Ok(data) => encoded.push((idx + 1, data)),
            Err(e) => {
                warn!("{}", e);
                failures.push(e);
            }
        }
    }

    let mut detection = detect::detect_pages(provider, encoded, pdf_name, config).await;
    merge_failures(&mut detection, failures, indices.len());
    Ok((detection, rendered.images))
}

fn merge_failures(detection: &mut VisualDetection, failures: Vec<PageError>, selected: usize) {
    detection.errors += failures.len();
    detection.failed_pages.extend(failures);
    detection.failed_pages.sort_by_key(PageError::page);
    detection.total_pages = selected;
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ExtractError::write(parent))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(ExtractError::write(path))
}
