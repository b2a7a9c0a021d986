//! Mock backend for running pipelines without the model service.
//!
//! [`MockBackend`] answers each request with a canned reply chosen by the
//! requesting stage's name, so replies stay deterministic even when stages
//! run concurrently. Every request is recorded for later inspection.
//!
//! # Example
//!
//! ```
//! use leftover_chef::backend::MockBackend;
//!
//! let mock = MockBackend::new()
//!     .reply("FoodShopping", r#"{"items": ["butter"]}"#)
//!     .fail("RecipeParser", 503);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

#[derive(Debug, Clone)]
enum Canned {
    Reply(String),
    Status(u16),
}

/// A test backend that returns canned responses per stage.
#[derive(Debug, Default)]
pub struct MockBackend {
    canned: HashMap<String, Canned>,
    fallback: Option<String>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests from `stage` with `text`.
    pub fn reply(mut self, stage: impl Into<String>, text: impl Into<String>) -> Self {
        self.canned.insert(stage.into(), Canned::Reply(text.into()));
        self
    }

    /// Answer requests from `stage` with an HTTP error.
    pub fn fail(mut self, stage: impl Into<String>, status: u16) -> Self {
        self.canned.insert(stage.into(), Canned::Status(status));
        self
    }

    /// Reply used for stages without a specific entry.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// The first request issued by `stage`, if any.
    pub fn request_for(&self, stage: &str) -> Option<LlmRequest> {
        self.requests().into_iter().find(|r| r.stage == stage)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        let canned = self
            .canned
            .get(&request.stage)
            .cloned()
            .or_else(|| self.fallback.clone().map(Canned::Reply));

        match canned {
            Some(Canned::Reply(text)) => Ok(LlmResponse {
                text,
                status: 200,
                metadata: None,
            }),
            Some(Canned::Status(status)) => Err(PipelineError::HttpError {
                status,
                body: format!("mock failure for {}", request.stage),
                retry_after: None,
            }),
            None => Err(PipelineError::Other(format!(
                "MockBackend has no reply for stage '{}'",
                request.stage
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationConfig;

    fn request(stage: &str) -> LlmRequest {
        LlmRequest {
            stage: stage.to_string(),
            model: "test".to_string(),
            system_instruction: None,
            prompt: "test".to_string(),
            config: GenerationConfig::default(),
            tools: Vec::new(),
            response_schema: None,
        }
    }

    #[tokio::test]
    async fn test_mock_routes_by_stage() {
        let mock = MockBackend::new().reply("a", "first").reply("b", "second");
        let client = Client::new();
        let rb = mock.complete(&client, "http://unused", &request("b")).await.unwrap();
        let ra = mock.complete(&client, "http://unused", &request("a")).await.unwrap();
        assert_eq!(ra.text, "first");
        assert_eq!(rb.text, "second");
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.requests()[0].stage, "b");
    }

    #[tokio::test]
    async fn test_mock_failure_and_fallback() {
        let mock = MockBackend::new().fail("down", 503).otherwise("default");
        let client = Client::new();
        let err = mock.complete(&client, "http://unused", &request("down")).await.unwrap_err();
        assert!(matches!(err, PipelineError::HttpError { status: 503, .. }));
        let ok = mock.complete(&client, "http://unused", &request("other")).await.unwrap();
        assert_eq!(ok.text, "default");
    }

    #[tokio::test]
    async fn test_mock_unknown_stage_errors() {
        let mock = MockBackend::new();
        let result = mock.complete(&Client::new(), "http://unused", &request("x")).await;
        assert!(result.is_err());
        assert!(mock.request_for("x").is_some());
    }
}
