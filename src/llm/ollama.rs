//! Ollama API client
//!
//! Streams `POST /api/generate` and accumulates the NDJSON chunks into the
//! full completion text.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::errors::{RecError, Result};
use crate::llm::{GenerationRequest, LlmBackend};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Ollama generation client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create client with custom configuration
    pub fn with_config(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(request: &GenerationRequest) -> OllamaGenerateRequest {
        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".to_string(), serde_json::json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), serde_json::json!(max_tokens));
        }

        OllamaGenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: true,
            format: request.json_mode.then(|| "json".to_string()),
            options: (!options.is_empty()).then(|| serde_json::Value::Object(options)),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| RecError::Generation(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecError::Generation(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut output = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| RecError::Generation(format!("Stream interrupted: {}", e)))?;
            pending.extend_from_slice(&chunk);

            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if accumulate_line(&line, &mut output)? {
                    debug!(model = %request.model, chars = output.len(), "generation complete");
                    return Ok(output);
                }
            }
        }

        // Trailing line without newline
        accumulate_line(&pending, &mut output)?;
        if output.is_empty() {
            return Err(RecError::Generation("Empty response from Ollama".to_string()));
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Append one NDJSON line to `output`; returns true on the `done` chunk
fn accumulate_line(line: &[u8], output: &mut String) -> Result<bool> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let chunk: OllamaChunk = serde_json::from_str(text)
        .map_err(|e| RecError::Generation(format!("Unparseable chunk: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(RecError::Generation(error));
    }
    output.push_str(&chunk.response);
    Ok(chunk.done)
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

/// One streamed response chunk
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
