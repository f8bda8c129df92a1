//! Progress-callback trait for per-page detection events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the detection pool works through the pages.
//!
//! # Example
//!
//! ```rust
//! use pdf_visual_extract::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     elements: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, elements: usize) {
//!         self.elements.fetch_add(elements, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} elements", page_num, total_pages, elements);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { elements: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the detection pool as it processes each page.
///
/// Pages run concurrently, so `on_page_start`, `on_page_complete` and
/// `on_page_error` may be invoked from several tasks at once. Protect shared
/// state with `Mutex` or atomics. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first page is submitted.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model request is sent for a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's detection succeeded.
    ///
    /// `elements` is the number of tables and figures found on the page.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, elements: usize) {
        let _ = (page_num, total_pages, elements);
    }

    /// Called when a page fails after all retries are exhausted.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Shared handle stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
