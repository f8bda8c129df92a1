//! Configuration types for PDF visual extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. One struct holds every knob so it can be
//! cloned into each concurrent page task and logged in full.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when neither the caller nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Upper bound for `max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use pdf_visual_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .concurrency(4)
///     .max_pages(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 300.
    ///
    /// Detection reads numbers out of dense financial tables; 300 DPI keeps
    /// small digits legible to the model.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps memory on oversized pages independently of DPI.
    pub max_rendered_pixels: u32,

    /// Number of concurrent model calls during detection. Default: 5.
    pub concurrency: usize,

    /// Model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per detection or cleaning call. Default: 4000.
    pub max_tokens: usize,

    /// Maximum tokens per CSV conversion call. Default: 2000.
    pub csv_max_tokens: usize,

    /// Retries on a failed model call (at most [`MAX_RETRIES`]). Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom detection prompt. If None, uses [`crate::prompts::DETECTION_PROMPT`].
    pub detection_prompt: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Only process the first N selected pages. Default: no cap.
    pub max_pages: Option<usize>,

    /// Visual elements with confidence at or below this are left out of the
    /// blend. Default: 0.3.
    pub min_confidence: f64,

    /// Ask the model to strip raw table text already captured by detection.
    /// Default: false.
    pub clean_text: bool,

    /// Write `page_NNN.png` files next to the other artefacts. Default: true.
    pub save_images: bool,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            concurrency: 5,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            csv_max_tokens: 2000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            detection_prompt: None,
            pages: PageSelection::default(),
            max_pages: None,
            min_confidence: 0.3,
            clean_text: false,
            save_images: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pages", &self.pages)
            .field("max_pages", &self.max_pages)
            .field("min_confidence", &self.min_confidence)
            .field("clean_text", &self.clean_text)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model name actually sent to the provider.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// 0-based page indices to process for a document of `total_pages`.
    ///
    /// Applies the page selection first, then the `max_pages` cap.
    pub fn page_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices = self.pages.to_indices(total_pages);
        if let Some(cap) = self.max_pages {
            indices.truncate(cap);
        }
        indices
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn csv_max_tokens(mut self, n: usize) -> Self {
        self.config.csv_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn detection_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.detection_prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn min_confidence(mut self, c: f64) -> Self {
        self.config.min_confidence = c;
        self
    }

    pub fn clean_text(mut self, v: bool) -> Self {
        self.config.clean_text = v;
        self
    }

    pub fn save_images(mut self, v: bool) -> Self {
        self.config.save_images = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_pages == Some(0) {
            return Err(ExtractError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(ExtractError::InvalidConfig(format!(
                "min_confidence must be within 0.0–1.0, got {}",
                c.min_confidence
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse the CLI form: `all`, `5`, `3-15` or `1,3,5`.
    pub fn parse(s: &str) -> Result<Self, ExtractError> {
        let s = s.trim().to_lowercase();
        let bad = |what: &str| ExtractError::InvalidConfig(format!("Invalid page {what}: '{s}'"));

        if s == "all" {
            return Ok(PageSelection::All);
        }

        if let Some((start, end)) = s.split_once('-') {
            let start: usize = start.trim().parse().map_err(|_| bad("range"))?;
            let end: usize = end.trim().parse().map_err(|_| bad("range"))?;
            if start < 1 || start > end {
                return Err(bad("range"));
            }
            return Ok(PageSelection::Range(start, end));
        }

        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>().map_err(|_| bad("list")))
                .collect::<Result<Vec<_>, _>>()?;
            if pages.contains(&0) {
                return Err(bad("list"));
            }
            return Ok(PageSelection::Set(pages));
        }

        match s.parse::<usize>() {
            Ok(p) if p >= 1 => Ok(PageSelection::Single(p)),
            _ => Err(bad("number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detection_settings() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.max_tokens, 4000);
        assert_eq!(c.model_name(), DEFAULT_MODEL);
        assert!((c.min_confidence - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn builder_clamps_values() {
        let c = ExtractionConfig::builder()
            .dpi(10)
            .concurrency(0)
            .temperature(9.0)
            .max_retries(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_retries, MAX_RETRIES);
    }

    #[test]
    fn builder_rejects_bad_confidence() {
        let err = ExtractionConfig::builder().min_confidence(1.5).build();
        assert!(matches!(err, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_zero_max_pages() {
        assert!(ExtractionConfig::builder().max_pages(0).build().is_err());
    }

    #[test]
    fn page_indices_apply_cap_after_selection() {
        let c = ExtractionConfig::builder()
            .pages(PageSelection::Range(3, 20))
            .max_pages(2)
            .build()
            .unwrap();
        assert_eq!(c.page_indices(10), vec![2, 3]);
    }

    #[test]
    fn selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn parse_selection_forms() {
        assert_eq!(PageSelection::parse("ALL").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("5").unwrap(), PageSelection::Single(5));
        assert_eq!(PageSelection::parse("3-15").unwrap(), PageSelection::Range(3, 15));
        assert_eq!(
            PageSelection::parse("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(PageSelection::parse("0").is_err());
        assert!(PageSelection::parse("9-2").is_err());
        assert!(PageSelection::parse("1,x").is_err());
    }
}
