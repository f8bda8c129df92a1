//! In-process [`LLMProvider`] whose replies are decided by a closure.
//!
//! The closure sees the last message of each request and returns a delay in
//! milliseconds plus either the reply text or an error message.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LLMResponse, LlmError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

type Script = dyn Fn(&ChatMessage) -> (u64, Result<String, String>) + Send + Sync;

pub(crate) struct ScriptedProvider {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(
        script: impl Fn(&ChatMessage) -> (u64, Result<String, String>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Page number carried in the image payload, e.g. `ImageData::new("page-3", ..)`.
pub(crate) fn image_page(message: &ChatMessage) -> Option<usize> {
    message
        .images
        .as_ref()?
        .first()?
        .data
        .strip_prefix("page-")?
        .parse()
        .ok()
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn max_context_length(&self) -> usize {
        128_000
    }

    async fn complete(&self, prompt: &str) -> edgequake_llm::Result<LLMResponse> {
        self.chat(&[ChatMessage::user(prompt)], None).await
    }

    async fn complete_with_options(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.complete(prompt).await
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: Option<&CompletionOptions>,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = messages
            .last()
            .ok_or_else(|| LlmError::InvalidRequest("empty conversation".to_string()))?;
        let (delay_ms, reply) = (self.script)(last);
        sleep(Duration::from_millis(delay_ms)).await;
        reply
            .map(|content| LLMResponse::new(content, "scripted-model").with_usage(100, 20))
            .map_err(LlmError::ApiError)
    }
}
