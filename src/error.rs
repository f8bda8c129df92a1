//! Error types for the pdf-visual-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] is **fatal**: the run cannot proceed at all (bad input
//!   file, wrong password, provider not configured, artefact not writable).
//!   Returned as `Err(ExtractError)` from the top-level functions.
//!
//! * [`PageError`] is **non-fatal**: a single page failed (empty text layer,
//!   render glitch, model call exhausted its retries) while every other page
//!   is fine. Stored inside [`crate::output::VisualDetection::failed_pages`]
//!   or [`crate::output::PageText::error`] so callers see partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-visual-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Local input does not carry a `.pdf` extension.
    #[error("File must be a PDF: '{path}'")]
    NotPdfExtension { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched nothing in the document.
    #[error("No pages selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every selected page failed detection; no visual output exists.
    #[error("All {total} pages failed detection after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── Artefact errors ───────────────────────────────────────────────────
    /// Could not read an intermediate artefact.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artefact could not be (de)serialised.
    #[error("Invalid JSON in '{context}': {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// CSV encoding failed.
    #[error("CSV export failed for '{path}': {detail}")]
    CsvFailed { path: PathBuf, detail: String },

    /// The Markdown → PDF writer failed.
    #[error("PDF export failed: {0}")]
    PdfExportFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub(crate) fn write(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ExtractError::OutputWriteFailed { path, source }
    }

    pub(crate) fn read(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ExtractError::ReadFailed { path, source }
    }

    pub(crate) fn json(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> Self {
        let context = context.into();
        move |source| ExtractError::Json { context, source }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page's text layer could not be read.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextFailed { page: usize, detail: String },

    /// Page rasterisation or PNG encoding failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Model call failed after retries.
    #[error("Page {page}: model call failed after {retries} retries: {detail}")]
    ModelFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// Model call timed out on the final attempt.
    #[error("Page {page}: model call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::TextFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::ModelFailed { page, .. }
            | PageError::Timeout { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_pages_failed_display() {
        let e = ExtractError::AllPagesFailed {
            total: 4,
            retries: 3,
            first_error: "HTTP 500".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 pages"), "got: {msg}");
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn extension_error_names_file() {
        let e = ExtractError::NotPdfExtension {
            path: PathBuf::from("report.docx"),
        };
        assert!(e.to_string().contains("report.docx"));
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::Timeout { page: 7, secs: 120 };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::ModelFailed {
            page: 2,
            retries: 3,
            detail: "rate limited".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn write_helper_keeps_path() {
        let err = ExtractError::write("out/x.json")(std::io::Error::other("disk full"));
        match err {
            ExtractError::OutputWriteFailed { path, .. } => {
                assert_eq!(path, PathBuf::from("out/x.json"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
