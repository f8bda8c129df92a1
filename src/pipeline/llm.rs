//! Model calls with timeout, retry and exponential backoff.
//!
//! Every request the pipeline makes (detection, cleaning, CSV conversion)
//! goes through [`call_with_retry`]. The wait before retry `n` is
//! `retry_backoff_ms * 2^(n-1)`: 500 ms → 1 s → 2 s with the defaults,
//! capped at one minute.
//! Each attempt is bounded by `api_timeout_secs`.

use crate::config::ExtractionConfig;
use crate::error::PageError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const MAX_BACKOFF_MS: u64 = 60_000;

/// Wait before retry number `retry` (1-based).
fn backoff_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Text and usage of a successful call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Attempts that failed before this one succeeded.
    pub retries: u32,
}

pub fn completion_options(config: &ExtractionConfig, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Run `call` until it succeeds or `max_retries` retries are used up.
///
/// `call` yields `(content, input_tokens, output_tokens)` or an error message.
/// The returned error is a timeout if the final attempt timed out, otherwise
/// [`PageError::ModelFailed`] carrying the last message.
pub async fn call_with_retry<F, Fut>(
    page: usize,
    config: &ExtractionConfig,
    mut call: F,
) -> Result<ModelReply, PageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(String, usize, usize), String>>,
{
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<PageError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, call()).await {
            Ok(Ok((content, input_tokens, output_tokens))) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page, input_tokens, output_tokens
                );
                return Ok(ModelReply {
                    content,
                    input_tokens,
                    output_tokens,
                    retries: attempt,
                });
            }
            Ok(Err(detail)) => {
                warn!("Page {}: attempt {} failed: {}", page, attempt + 1, detail);
                last_err = Some(PageError::ModelFailed {
                    page,
                    retries: config.max_retries,
                    detail,
                });
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(PageError::Timeout {
                    page,
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| PageError::ModelFailed {
        page,
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    }))
}

/// Send `messages` to `provider` through [`call_with_retry`].
pub async fn chat(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    page: usize,
    config: &ExtractionConfig,
) -> Result<ModelReply, PageError> {
    call_with_retry(page, config, move || async move {
        provider
            .chat(messages, Some(options))
            .await
            .map(|r| (r.content, r.prompt_tokens, r.completion_tokens))
            .map_err(|e| e.to_string())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 8), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(500, 70), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 2), MAX_BACKOFF_MS);
    }

    #[test]
    fn options_follow_config() {
        let config = ExtractionConfig::default();
        let opts = completion_options(&config, config.csv_max_tokens);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(2000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let reply = call_with_retry(1, &fast_config(3), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("HTTP 429".to_string())
                } else {
                    Ok(("{}".to_string(), 10, 5))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(reply.retries, 2);
        assert_eq!(reply.input_tokens, 10);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_last_error() {
        let attempts = AtomicU32::new(0);
        let err = call_with_retry(4, &fast_config(2), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(String, usize, usize), _>("HTTP 500".to_string()) }
        })
        .await
        .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            err,
            PageError::ModelFailed {
                page: 4,
                retries: 2,
                detail: "HTTP 500".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let err = call_with_retry(2, &fast_config(0), || async {
            sleep(Duration::from_secs(5)).await;
            Ok((String::new(), 0, 0))
        })
        .await
        .unwrap_err();
        assert_eq!(err, PageError::Timeout { page: 2, secs: 1 });
    }
}
