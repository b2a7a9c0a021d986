//! Execution context shared across stage invocations.
//!
//! [`ExecCtx`] carries the HTTP client, model backend, endpoint, retry
//! policy and optional event handler. It is built once at startup and shared
//! by every request; per-request data lives in the
//! [`NamedContext`](crate::context::NamedContext) instead.

use crate::backend::gemini::DEFAULT_BASE_URL;
use crate::backend::{Backend, BackoffConfig};
use crate::error::Result;
use crate::events::EventHandler;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Shared execution context for stage invocations.
///
/// # Example
///
/// ```
/// use leftover_chef::{ExecCtx, MockBackend};
/// use std::sync::Arc;
///
/// let ctx = ExecCtx::builder(Arc::new(MockBackend::new()))
///     .base_url("http://localhost:8080/v1beta/")
///     .build()
///     .unwrap();
/// assert_eq!(ctx.base_url, "http://localhost:8080");
/// ```
pub struct ExecCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Base URL of the model service.
    pub base_url: String,
    /// Model backend.
    pub backend: Arc<dyn Backend>,
    /// Transport retry configuration. Default: [`BackoffConfig::gemini()`].
    pub backoff: BackoffConfig,
    /// Optional event handler for lifecycle events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    /// Create a new builder around a backend.
    pub fn builder(backend: Arc<dyn Backend>) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            backend,
            backoff: None,
            event_handler: None,
            timeout: None,
        }
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("backoff", &self.backoff)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Arc<dyn Backend>,
    backoff: Option<BackoffConfig>,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, one is built with the configured timeout.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the base URL of the model service.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the transport retry configuration.
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the per-request timeout. Default: 120 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the execution context.
    pub fn build(self) -> Result<ExecCtx> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(120)))
                .build()?,
        };
        Ok(ExecCtx {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend: self.backend,
            backoff: self.backoff.unwrap_or_default(),
            event_handler: self.event_handler,
        })
    }
}

/// Strip API version suffixes from a base URL; the backend appends its own.
/// e.g. "https://generativelanguage.googleapis.com/v1beta" -> "https://generativelanguage.googleapis.com"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in ["/v1beta/models", "/v1beta", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
