//! Table and figure detection with a bounded pool of concurrent model calls.
//!
//! ```text
//! pages ──▶ run_bounded(concurrency) ──▶ completion order ──▶ assemble
//!             detect_page × N                                 sort by page
//! ```
//!
//! Each page is independent: a failure is recorded as a [`PageError`] and the
//! remaining pages carry on. Results arrive in completion order and are
//! sorted by page number before they are returned, so output never depends
//! on scheduling.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::output::{DetectionResult, VisualDetection, VisualPage};
use crate::pipeline::render::image_filename;
use crate::pipeline::{llm, repair, write_json};
use crate::prompts::DETECTION_PROMPT;
use edgequake_llm::{ChatMessage, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Detect tables and figures on one page image (1-based `page_number`).
///
/// An empty model response is not an error: it yields a page with no
/// elements and the summary "No response content".
pub async fn detect_page(
    provider: &Arc<dyn LLMProvider>,
    page_number: usize,
    image: ImageData,
    config: &ExtractionConfig,
) -> Result<VisualPage, PageError> {
    let prompt = config
        .detection_prompt
        .as_deref()
        .unwrap_or(DETECTION_PROMPT);
    let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
    let options = llm::completion_options(config, config.max_tokens);

    let reply = llm::chat(provider, &messages, &options, page_number, config).await?;
    Ok(page_from_reply(page_number, reply))
}

fn page_from_reply(page_number: usize, reply: llm::ModelReply) -> VisualPage {
    let detection_result = if reply.content.trim().is_empty() {
        DetectionResult::empty("No response content")
    } else {
        repair::parse_with_fallback(&reply.content, page_number)
    };
    debug!(
        "Page {}: {} elements detected",
        page_number,
        detection_result.elements.len()
    );

    VisualPage {
        page_number,
        image_filename: image_filename(page_number.saturating_sub(1)),
        detection_result,
        processing_timestamp: chrono::Utc::now().to_rfc3339(),
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
        retries: reply.retries,
    }
}

/// Drive `f` over `items` with at most `concurrency` futures in flight.
///
/// Results are returned in completion order.
pub async fn run_bounded<I, T, F, Fut>(
    items: impl IntoIterator<Item = I>,
    concurrency: usize,
    f: F,
) -> Vec<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Detect every `(page_number, image)` pair concurrently.
///
/// `total_pages` in the result is the number of pages submitted.
pub async fn detect_pages(
    provider: &Arc<dyn LLMProvider>,
    pages: Vec<(usize, ImageData)>,
    pdf_name: &str,
    config: &ExtractionConfig,
) -> VisualDetection {
    let total = pages.len();
    let callback = config.progress_callback.clone();
    info!(
        "Detecting elements on {} pages ({} concurrent, model {})",
        total,
        config.concurrency,
        config.model_name()
    );
    if let Some(ref cb) = callback {
        cb.on_run_start(total);
    }

    let outcomes = run_bounded(pages, config.concurrency, |(page_number, image)| {
        let provider = Arc::clone(provider);
        let callback = callback.clone();
        async move {
            if let Some(ref cb) = callback {
                cb.on_page_start(page_number, total);
            }
            let outcome = detect_page(&provider, page_number, image, config).await;
            if let Some(ref cb) = callback {
                match &outcome {
                    Ok(page) => {
                        cb.on_page_complete(page_number, total, page.detection_result.elements.len())
                    }
                    Err(e) => cb.on_page_error(page_number, total, &e.to_string()),
                }
            }
            outcome
        }
    })
    .await;

    let detection = assemble_detection(pdf_name, total, outcomes);
    if let Some(ref cb) = callback {
        cb.on_run_complete(total, detection.pages.len());
    }
    info!(
        "Detection complete: {} elements, {} errors",
        detection.total_elements, detection.errors
    );
    detection
}

/// Fold per-page outcomes into a [`VisualDetection`], sorted by page.
pub fn assemble_detection(
    pdf_name: &str,
    total_pages: usize,
    outcomes: Vec<Result<VisualPage, PageError>>,
) -> VisualDetection {
    let mut detection = VisualDetection {
        pdf_name: pdf_name.to_string(),
        total_pages,
        ..Default::default()
    };

    for outcome in outcomes {
        match outcome {
            Ok(page) => {
                detection.total_elements += page.detection_result.elements.len();
                detection.pages.push(page);
            }
            Err(e) => {
                detection.errors += 1;
                detection.failed_pages.push(e);
            }
        }
    }

    detection.pages.sort_by_key(|p| p.page_number);
    detection.failed_pages.sort_by_key(PageError::page);
    detection
}

/// Write a [`VisualDetection`] as pretty JSON.
pub fn save_visual_detection(detection: &VisualDetection, path: &Path) -> Result<(), ExtractError> {
    write_json(detection, path)
}
