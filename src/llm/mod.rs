//! Text-generation backends
//!
//! Provides the transport seam the agents call through:
//! - `OllamaClient`: local Ollama server, streaming `/api/generate`
//! - `OpenAiClient`: any OpenAI-compatible `/chat/completions` endpoint
//!
//! Backends make exactly one attempt per request. Every failure is a
//! `RecError::Generation`.

pub mod ollama;
pub mod openai;

pub use ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
pub use openai::{OpenAiClient, DEFAULT_OPENAI_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{RecError, Result};

/// Default chat model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Model identifier and decoding parameters for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Ask the backend for a JSON object
    #[serde(default)]
    pub json_mode: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.0),
            max_tokens: None,
            json_mode: false,
        }
    }
}

/// A single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

impl GenerationRequest {
    pub fn new(config: &ModelConfig, prompt: String) -> Self {
        Self {
            model: config.model.clone(),
            prompt,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_mode: config.json_mode,
        }
    }
}

/// Text-generation transport
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Short label for logs
    fn name(&self) -> &str;
}

/// Supported transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl FromStr for Provider {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            other => Err(RecError::Config(format!("Unknown LLM provider: {}", other))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Build a backend for `provider`
///
/// `api_key` is required for OpenAI-compatible endpoints and ignored by
/// Ollama.
pub fn connect(
    provider: Provider,
    base_url: Option<&str>,
    api_key: Option<String>,
    request_timeout: std::time::Duration,
) -> Result<Arc<dyn LlmBackend>> {
    match provider {
        Provider::Ollama => Ok(Arc::new(OllamaClient::with_config(
            base_url.unwrap_or(DEFAULT_OLLAMA_URL),
            request_timeout,
        )?)),
        Provider::OpenAi => {
            let api_key = api_key.ok_or_else(|| {
                RecError::Config("An API key is required for the openai provider".to_string())
            })?;
            Ok(Arc::new(OpenAiClient::with_config(
                base_url.unwrap_or(DEFAULT_OPENAI_URL),
                api_key,
                request_timeout,
            )?))
        }
    }
}
