use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
///
/// Every error that originates inside a stage carries the stage name, so a
/// failed run can be attributed without inspecting the final merge.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A stage failed with a descriptive message.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// A structured stage replied with something that does not fit its schema.
    #[error("Stage '{stage}' returned output that does not match its schema: {reason}")]
    SchemaViolation { stage: String, reason: String },

    /// A stage needed a context entry that no upstream stage produced.
    #[error("Stage '{stage}' is missing input '{key}'")]
    MissingInput { stage: String, key: String },

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the model service answers with a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Name of the stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailed { stage, .. }
            | PipelineError::SchemaViolation { stage, .. }
            | PipelineError::MissingInput { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Attach a stage name to an error that doesn't already carry one.
    pub(crate) fn in_stage(self, stage: &str) -> Self {
        if self.stage().is_some() {
            return self;
        }
        PipelineError::StageFailed {
            stage: stage.to_string(),
            message: self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_transport_errors() {
        let err = PipelineError::HttpError {
            status: 503,
            body: "unavailable".into(),
            retry_after: None,
        }
        .in_stage("RecipeThinker");
        assert_eq!(err.stage(), Some("RecipeThinker"));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_in_stage_keeps_existing_attribution() {
        let err = PipelineError::SchemaViolation {
            stage: "DietFormatter".into(),
            reason: "missing field".into(),
        }
        .in_stage("DietBranch");
        assert_eq!(err.stage(), Some("DietFormatter"));
    }
}
