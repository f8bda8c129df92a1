//! CLI binary for pdf-visual-extract.
//!
//! A thin shim over the library crate: each subcommand maps its flags to an
//! `ExtractionConfig`, calls one library entry point and prints a short
//! summary to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_visual_extract::export::{csv, markdown, pdf};
use pdf_visual_extract::pipeline::{blend, clean, detect, inject, input, read_json, text};
use pdf_visual_extract::{
    detect_visual_elements, extract_text_from_pdf, inspect, render_page_images, resolve_provider,
    run_batch, run_pipeline, EnrichedDocument, ExtractionConfig, ExtractionProgressCallback,
    PageSelection, PipelineOptions, ProgressCallback, TextExtraction, VisualDetection,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar for the detection pool. Pages may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Detecting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Detecting tables and figures on {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, elements: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{elements:>2} elements")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} pages analysed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages analysed  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline on the first 10 pages, every export
  pdf-visual-extract run report.pdf -o output --all

  # Every PDF in a directory
  pdf-visual-extract batch data/ -o output --export-md --export-csv

  # Individual steps
  pdf-visual-extract text report.pdf -o report_text.json
  pdf-visual-extract detect report.pdf --pages 3-8 -o report_tables_figures.json
  pdf-visual-extract inject report_text.json report_tables_figures.json -o report_with_tables.json
  pdf-visual-extract blend report_text.json report_tables_figures.json -o report.jsonl
  pdf-visual-extract markdown report.jsonl -o report.md
  pdf-visual-extract csv report_with_tables.json -o exports/
  pdf-visual-extract pdf report.md -o report.pdf

  # Inspect PDF metadata (no API key needed)
  pdf-visual-extract inspect report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when no --provider is given (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Model ID (default gpt-4o-mini)
  PDFIUM_LIB_PATH         Path to libpdfium, or the directory containing it
  PDFVX_*                 Every flag, e.g. PDFVX_CONCURRENCY=8
"#;

/// Extract text, tables and figures from PDFs with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-visual-extract",
    version,
    about = "Extract text, tables and figures from PDFs with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFVX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFVX_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDFVX_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the complete pipeline on one PDF.
    Run {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        #[arg(short, long, env = "PDFVX_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,
        #[command(flatten)]
        stages: StageArgs,
        #[command(flatten)]
        pages: PageArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Run the pipeline on every PDF in a directory.
    Batch {
        data_dir: PathBuf,
        #[arg(short, long, env = "PDFVX_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,
        /// Process at most this many PDFs.
        #[arg(long, env = "PDFVX_MAX_PDFS")]
        max_pdfs: Option<usize>,
        #[command(flatten)]
        stages: StageArgs,
        #[command(flatten)]
        pages: PageArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Extract the text layer to JSON.
    Text {
        input: String,
        /// Output file (default `{name}_text.json`).
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        pages: PageArgs,
    },
    /// Render pages to PNG files.
    Images {
        input: String,
        #[arg(short, long, default_value = "images")]
        output_dir: PathBuf,
        /// Rendering DPI (72–400).
        #[arg(long, env = "PDFVX_DPI", default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=400))]
        dpi: u32,
        #[command(flatten)]
        pages: PageArgs,
    },
    /// Detect tables and figures with a VLM and write JSON.
    Detect {
        input: String,
        /// Output file (default `{name}_tables_figures.json`).
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        pages: PageArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Attach detected tables to the text JSON.
    Inject {
        text_file: PathBuf,
        visual_file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove table text duplicated in the page text, using an LLM.
    Clean {
        /// Enriched JSON written by `inject`.
        input: PathBuf,
        /// Visual detection JSON; defaults to the tables already injected.
        #[arg(long)]
        visual: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Blend text and detected elements into JSONL.
    Blend {
        text_file: PathBuf,
        visual_file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Drop elements whose confidence is at or below this value.
        #[arg(long, env = "PDFVX_MIN_CONFIDENCE", default_value_t = 0.3)]
        min_confidence: f64,
    },
    /// Convert enriched JSON or blended JSONL to Markdown.
    Markdown {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Convert the tables of an enriched JSON to CSV files.
    Csv {
        input: PathBuf,
        /// Directory receiving `csv_exports/`.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Flatten tables without calling a model.
        #[arg(long, env = "PDFVX_NO_MODEL")]
        no_model: bool,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Typeset a Markdown file as PDF.
    Pdf {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print PDF metadata.
    Inspect {
        input: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

/// Optional stages of `run` and `batch`.
#[derive(Args, Debug)]
struct StageArgs {
    /// Write the Markdown report.
    #[arg(long, env = "PDFVX_EXPORT_MD")]
    export_md: bool,
    /// Write the PDF report.
    #[arg(long, env = "PDFVX_EXPORT_PDF")]
    export_pdf: bool,
    /// Write one CSV per table.
    #[arg(long, env = "PDFVX_EXPORT_CSV")]
    export_csv: bool,
    /// Write the blended JSONL element stream.
    #[arg(long, env = "PDFVX_BLEND")]
    blend: bool,
    /// Enable every export and the blend.
    #[arg(long)]
    all: bool,
    /// Run the LLM text cleaner before exporting.
    #[arg(long, env = "PDFVX_CLEAN_TEXT")]
    clean_text: bool,
}

impl StageArgs {
    fn options(&self) -> PipelineOptions {
        if self.all {
            return PipelineOptions::all();
        }
        PipelineOptions {
            export_md: self.export_md,
            export_pdf: self.export_pdf,
            export_csv: self.export_csv,
            blend: self.blend,
        }
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFVX_PAGES", default_value = "all")]
    pages: String,

    /// Process at most this many pages (`run` and `batch` default to 10; 0 = no cap).
    #[arg(long, env = "PDFVX_MAX_PAGES")]
    max_pages: Option<usize>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFVX_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (default gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFVX_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "PDFVX_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Max output tokens per detection or cleaning call.
    #[arg(long, env = "PDFVX_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFVX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per model call.
    #[arg(long, env = "PDFVX_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PDFVX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Drop blended elements whose confidence is at or below this value.
    #[arg(long, env = "PDFVX_MIN_CONFIDENCE", default_value_t = 0.3)]
    min_confidence: f64,

    /// Text file replacing the built-in detection prompt.
    #[arg(long, env = "PDFVX_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let uses_pool = matches!(
        cli.command,
        Command::Run { .. } | Command::Batch { .. } | Command::Detect { .. }
    );
    let show_progress = uses_pool && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let quiet = cli.quiet;

    match cli.command {
        Command::Run {
            input,
            output_dir,
            stages,
            pages,
            model,
        } => {
            let config =
                build_config(&pages, Some(&model), stages.clean_text, Some(10), progress).await?;
            let report = run_pipeline(&input, &output_dir, &stages.options(), &config)
                .await
                .context("Pipeline failed")?;
            if !quiet {
                eprintln!(
                    "{}  {} pages  {} elements  {} tables  {}ms  →  {}",
                    if report.detection_errors == 0 { green("✔") } else { cyan("⚠") },
                    report.pages_processed,
                    report.total_elements,
                    report.tables_found,
                    report.duration_ms,
                    bold(&report.output_dir.display().to_string()),
                );
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&report.input_tokens.to_string()),
                    dim(&report.output_tokens.to_string()),
                );
            }
        }

        Command::Batch {
            data_dir,
            output_dir,
            max_pdfs,
            stages,
            pages,
            model,
        } => {
            let config =
                build_config(&pages, Some(&model), stages.clean_text, Some(10), progress).await?;
            let batch = run_batch(&data_dir, &output_dir, &stages.options(), &config, max_pdfs)
                .await
                .context("Batch failed")?;
            if !quiet {
                eprintln!(
                    "{}  {} processed, {} failed  →  {}",
                    if batch.failed.is_empty() { green("✔") } else { cyan("⚠") },
                    batch.processed.len(),
                    batch.failed.len(),
                    bold(&output_dir.display().to_string()),
                );
                for (path, err) in &batch.failed {
                    eprintln!("   {} {}: {}", red("✗"), path.display(), err);
                }
            }
        }

        Command::Text {
            input,
            output,
            pages,
        } => {
            let config = build_config(&pages, None, false, None, None).await?;
            let result = extract_text_from_pdf(&input, &config)
                .await
                .context("Text extraction failed")?;
            let output = output.unwrap_or_else(|| default_output(&input, "_text.json"));
            text::save_text_extraction(&result, &output)?;
            let failed = result.pages.iter().filter(|p| p.error.is_some()).count();
            summary(
                quiet,
                failed == 0,
                &format!("{} pages, {} chars", result.pages.len(), result.full_text.len()),
                &output,
            );
        }

        Command::Images {
            input,
            output_dir,
            dpi,
            pages,
        } => {
            let mut config = build_config(&pages, None, false, None, None).await?;
            config.dpi = dpi;
            let paths = render_page_images(&input, &output_dir, &config)
                .await
                .context("Rendering failed")?;
            summary(quiet, true, &format!("{} images", paths.len()), &output_dir);
        }

        Command::Detect {
            input,
            output,
            pages,
            model,
        } => {
            let config = build_config(&pages, Some(&model), false, None, progress).await?;
            let detection = detect_visual_elements(&input, &config)
                .await
                .context("Detection failed")?;
            let output = output.unwrap_or_else(|| default_output(&input, "_tables_figures.json"));
            detect::save_visual_detection(&detection, &output)?;
            summary(
                quiet,
                detection.errors == 0,
                &format!(
                    "{} pages, {} elements, {} errors",
                    detection.pages.len(),
                    detection.total_elements,
                    detection.errors
                ),
                &output,
            );
        }

        Command::Inject {
            text_file,
            visual_file,
            output,
        } => {
            let text: TextExtraction = read_json(&text_file)?;
            let visual: VisualDetection = read_json(&visual_file)?;
            let tables = inject::extract_tables_from_visual(&visual);
            let doc = inject::inject_tables_into_text(&text, &tables);
            inject::save_enriched_document(&doc, &output)?;
            summary(
                quiet,
                true,
                &format!("{} tables on {} pages", doc.table_count(), doc.pages.len()),
                &output,
            );
        }

        Command::Clean {
            input,
            visual,
            output,
            model,
        } => {
            let config = build_config(&PageArgs::all(), Some(&model), true, None, None).await?;
            let provider = resolve_provider(&config)?;
            let doc: EnrichedDocument = read_json(&input)?;
            let visual = visual
                .as_deref()
                .map(read_json::<VisualDetection>)
                .transpose()?;
            let cleaned = clean::clean_document(&provider, &doc, visual.as_ref(), &config).await;
            inject::save_enriched_document(&cleaned, &output)?;
            let n = cleaned.pages.iter().filter(|p| p.text_cleaned).count();
            summary(quiet, true, &format!("{n} pages cleaned"), &output);
        }

        Command::Blend {
            text_file,
            visual_file,
            output,
            min_confidence,
        } => {
            let text: TextExtraction = read_json(&text_file)?;
            let visual: VisualDetection = read_json(&visual_file)?;
            let (elements, stats) = blend::blend_text_extraction(&text, &visual, min_confidence);
            blend::save_blended_jsonl(&elements, &stats, &output)?;
            summary(quiet, true, &format!("{} elements", elements.len()), &output);
        }

        Command::Markdown { input, output } => {
            let md = if input.extension().is_some_and(|e| e.eq_ignore_ascii_case("jsonl")) {
                let (stats, elements) = blend::load_blended_jsonl(&input)?;
                let name = stats
                    .as_ref()
                    .map(|s| s.pdf_name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| input::pdf_name(&input));
                let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
                markdown::blend_to_markdown(&name, stats.as_ref(), &elements, &now)
            } else {
                let doc: EnrichedDocument = read_json(&input)?;
                markdown::document_to_markdown(&doc)
            };
            write_output(&output, md.as_bytes())?;
            summary(quiet, true, &format!("{} bytes", md.len()), &output);
        }

        Command::Csv {
            input,
            output_dir,
            no_model,
            model,
        } => {
            let config = build_config(&PageArgs::all(), Some(&model), false, None, None).await?;
            let provider = if no_model {
                None
            } else {
                Some(resolve_provider(&config)?)
            };
            let doc: EnrichedDocument = read_json(&input)?;
            let result = csv::convert_tables_to_csv(
                provider.as_ref(),
                &doc,
                &output_dir,
                &doc.pdf_name,
                &config,
            )
            .await?;
            summary(
                quiet,
                result.errors.is_empty(),
                &format!(
                    "{}/{} tables converted, {} by model",
                    result.converted_tables,
                    result.total_tables,
                    result.csv_files.iter().filter(|f| f.model_converted).count()
                ),
                &output_dir.join(csv::CSV_DIR),
            );
        }

        Command::Pdf { input, output } => {
            pdf::convert_markdown_file_to_pdf(&input, &output)?;
            summary(quiet, true, "PDF written", &output);
        }

        Command::Inspect { input, json } => {
            let meta = inspect(&input).await.context("Failed to inspect PDF")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:         {}", input);
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                println!("PDF Version:  {}", meta.pdf_version);
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
            }
        }
    }

    Ok(())
}

impl PageArgs {
    fn all() -> Self {
        Self {
            pages: "all".into(),
            max_pages: None,
            password: None,
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
///
/// `default_max_pages` applies when `--max-pages` is absent; `--max-pages 0`
/// removes the cap.
async fn build_config(
    pages: &PageArgs,
    model: Option<&ModelArgs>,
    clean_text: bool,
    default_max_pages: Option<usize>,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let selection = PageSelection::parse(&pages.pages).context("Invalid --pages")?;
    let mut builder = ExtractionConfig::builder()
        .pages(selection)
        .clean_text(clean_text);

    match pages.max_pages.or(default_max_pages) {
        Some(0) | None => {}
        Some(n) => builder = builder.max_pages(n),
    }
    if let Some(ref pwd) = pages.password {
        builder = builder.password(pwd.clone());
    }

    if let Some(m) = model {
        builder = builder
            .dpi(m.dpi)
            .concurrency(m.concurrency)
            .max_tokens(m.max_tokens)
            .temperature(m.temperature)
            .max_retries(m.max_retries)
            .api_timeout_secs(m.api_timeout)
            .min_confidence(m.min_confidence);
        if let Some(ref name) = m.model {
            builder = builder.model(name.clone());
        }
        if let Some(ref provider) = m.provider {
            builder = builder.provider_name(provider.clone());
        }
        if let Some(ref path) = m.prompt_file {
            let prompt = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?;
            builder = builder.detection_prompt(prompt);
        }
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `{pdf_name}{suffix}` in the current directory.
fn default_output(input_str: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", input::pdf_name(Path::new(input_str)), suffix))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

fn summary(quiet: bool, ok: bool, detail: &str, path: &Path) {
    if quiet {
        return;
    }
    eprintln!(
        "{}  {}  →  {}",
        if ok { green("✔") } else { cyan("⚠") },
        detail,
        bold(&path.display().to_string()),
    );
}
