//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over the hosted model service, translating
//! a provider-agnostic [`LlmRequest`] into an HTTP call and back into an
//! [`LlmResponse`]. Built-in implementations: [`GeminiBackend`] for the real
//! service and [`MockBackend`] for tests and offline runs.
//!
//! ```text
//! StageAgent ──► LlmRequest ──► with_backoff ──► Backend::complete() ──► LlmResponse
//!                                                       │
//!                                          ┌────────────┴────────────┐
//!                                    GeminiBackend               MockBackend
//!                              :generateContent            canned by stage name
//! ```

pub mod backoff;
pub mod gemini;
pub mod mock;

pub use backoff::BackoffConfig;
pub use gemini::GeminiBackend;
pub use mock::MockBackend;

use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// Sampling parameters for one model call.
///
/// Unset fields are left out of the request so the service applies its own
/// defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: Option<f64>,

    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl GenerationConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// A capability the model may use while answering.
///
/// Tool calls happen inside the model service; their results only show up
/// as part of the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Grounding with web search.
    GoogleSearch,
    /// Sandboxed code execution.
    CodeExecution,
}

/// A normalized model request.
///
/// [`StageAgent`](crate::agent::StageAgent) builds this from its
/// configuration; the [`Backend`] turns it into the provider's wire format.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Name of the stage issuing the request (for logs and mock routing).
    pub stage: String,

    /// Model identifier (e.g. `"gemini-2.5-flash-lite"`).
    pub model: String,

    /// Rendered stage instruction, sent as the system instruction.
    pub system_instruction: Option<String>,

    /// The user message.
    pub prompt: String,

    /// Sampling parameters.
    pub config: GenerationConfig,

    /// Tools the model may use.
    pub tools: Vec<Tool>,

    /// If set, the reply must be JSON matching this schema.
    pub response_schema: Option<Value>,
}

/// A normalized model response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model version).
    pub metadata: Option<Value>,
}

/// Abstraction over model providers.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a single model call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`PipelineError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with a status in `config.retryable_statuses`
/// - [`PipelineError::Request`] (connection/transport errors)
pub fn is_retryable(error: &PipelineError, config: &BackoffConfig) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        PipelineError::Request(_) => true,
        _ => false,
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Returns the first successful response, or the last error once the retry
/// budget is spent or a non-retryable error comes back.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    mut on_retry: RetryCallback<'_>,
) -> Result<LlmResponse> {
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = match &last_error {
                Some(PipelineError::HttpError {
                    retry_after: Some(ra),
                    ..
                }) if config.respect_retry_after => *ra,
                _ => config.delay_for_attempt(attempt - 1),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            tracing::warn!(
                stage = %request.stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "retrying model call"
            );
            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::time::sleep(delay).await;
        }

        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        PipelineError::Other("backoff loop exited unexpectedly".into())
    }))
}
