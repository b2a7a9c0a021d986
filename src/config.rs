//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment; a `.env`
//! file in the working directory is loaded by the binary before parsing.

use crate::{
    agent::DEFAULT_MODEL,
    backend::{gemini::DEFAULT_BASE_URL, BackoffConfig, GeminiBackend, GenerationConfig},
    chef::ChefConfig,
    error::Result,
    events::TracingEventHandler,
    exec_ctx::ExecCtx,
    PipelineError,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Leftover Chef - turn leftovers into a recipe, a shopping list and a
/// nutrition table
#[derive(Parser, Debug, Clone)]
#[command(name = "leftover-chef", version)]
#[command(about = "Turn leftovers into a recipe, a shopping list and a nutrition table", long_about = None)]
pub struct AppConfig {
    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used by every stage
    #[arg(long, env = "CHEF_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Sampling temperature; the service default when unset
    #[arg(long, env = "CHEF_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Output token limit per stage; the service default when unset
    #[arg(long, env = "CHEF_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Address the HTTP server listens on
    #[arg(long, env = "CHEF_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Base URL of the Gemini API
    #[arg(long, env = "CHEF_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout for model calls, in seconds
    #[arg(long, env = "CHEF_TIMEOUT_SECS", default_value = "120")]
    pub timeout_secs: u64,

    /// Attempts per model call, first call included
    #[arg(long, env = "CHEF_ATTEMPTS", default_value = "5")]
    pub attempts: u32,

    /// Run the pipeline once for these leftovers, print the result and exit
    #[arg(long, value_name = "LEFTOVERS")]
    pub once: Option<String>,
}

impl AppConfig {
    /// Build the shared execution context for the Gemini backend.
    pub fn exec_ctx(&self) -> Result<ExecCtx> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::InvalidConfig(
                    "GOOGLE_API_KEY is not set (pass --api-key or add it to .env)".to_string(),
                )
            })?;

        if self.attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "attempts must be at least 1".to_string(),
            ));
        }

        ExecCtx::builder(Arc::new(GeminiBackend::new(api_key)))
            .base_url(self.base_url.clone())
            .timeout(Duration::from_secs(self.timeout_secs))
            .backoff(BackoffConfig::gemini().with_attempts(self.attempts))
            .event_handler(Arc::new(TracingEventHandler))
            .build()
    }

    pub fn chef_config(&self) -> ChefConfig {
        let mut generation = GenerationConfig::default();
        if let Some(temperature) = self.temperature {
            generation = generation.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            generation = generation.with_max_tokens(max_tokens);
        }
        ChefConfig {
            model: self.model.clone(),
            generation,
        }
    }
}
