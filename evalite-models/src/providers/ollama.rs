//! Ollama local model responder.
//!
//! Connects to an Ollama instance for running models like Llama, Mistral, etc.
//! A model configuration's `base_url` takes precedence over the responder's
//! host, so one responder can serve several Ollama machines.
//!
//! # Example
//!
//! ```ignore
//! use evalite_models::providers::OllamaResponder;
//!
//! let responder = OllamaResponder::new();  // Uses localhost:11434
//! let responder = OllamaResponder::with_base_url("http://192.168.1.100:11434");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DeltaStream, InferRequest, Responder, StreamDelta};
use crate::{Error, Result};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// ────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ────────────────────────────────────────────────────────────────────────────

/// Message in an Ollama chat request/response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaChatMessage {
    pub role: String,
    pub content: String,
}

/// Request body for Ollama's `/api/chat` endpoint.
#[derive(Debug, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaChatOptions>,
}

/// Chat options for Ollama.
#[derive(Debug, Serialize)]
pub struct OllamaChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Response from Ollama's `/api/chat` endpoint.
#[derive(Debug, Deserialize)]
pub struct OllamaChatResponse {
    pub message: OllamaChatMessage,
    pub done: bool,
}

impl OllamaChatResponse {
    fn to_delta(&self) -> StreamDelta {
        StreamDelta {
            text: if self.message.content.is_empty() {
                None
            } else {
                Some(self.message.content.clone())
            },
            done: self.done,
        }
    }
}

impl OllamaChatRequest {
    fn from_infer(request: &InferRequest, stream: bool) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|m| OllamaChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let opts = request.options;
        let options = if opts.temperature.is_some() || opts.max_tokens.is_some() {
            Some(OllamaChatOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            })
        } else {
            None
        };

        Self {
            model: request.model_config.model_name.clone(),
            messages,
            stream,
            options,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OllamaResponder
// ────────────────────────────────────────────────────────────────────────────

/// Ollama responder. Needs no credentials.
pub struct OllamaResponder {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaResponder {
    /// Create a responder with the default URL (localhost:11434).
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a responder with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Get the base URL for this responder.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self, request: &InferRequest) -> String {
        let base = request
            .model_config
            .base_url
            .as_deref()
            .unwrap_or(&self.base_url);
        format!("{}/api/chat", base.trim_end_matches('/'))
    }

    async fn post(&self, request: &InferRequest, stream: bool) -> Result<reqwest::Response> {
        let url = self.chat_url(request);
        let body = OllamaChatRequest::from_infer(request, stream);
        debug!(%url, model = %body.model, stream, "sending ollama chat request");

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "Ollama API returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

impl Default for OllamaResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for OllamaResponder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: InferRequest) -> Result<String> {
        let response = self.post(&request, false).await?;
        let chat: OllamaChatResponse = response.json().await?;
        Ok(chat.message.content)
    }

    async fn generate_stream(&self, request: InferRequest) -> Result<DeltaStream> {
        use futures_util::StreamExt;

        let response = self.post(&request, true).await?;

        // NDJSON: one response object per line
        let stream = response
            .bytes_stream()
            .map(|result| {
                result.map_err(Error::from).and_then(|bytes| {
                    let text = String::from_utf8_lossy(&bytes);
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        return Ok(StreamDelta::default());
                    }
                    serde_json::from_str::<OllamaChatResponse>(trimmed)
                        .map(|r| r.to_delta())
                        .map_err(Error::Serialization)
                })
            })
            .filter(|result| {
                std::future::ready(match result {
                    Ok(delta) => delta.text.is_some() || delta.done,
                    Err(_) => true,
                })
            });

        Ok(Box::pin(stream))
    }
}
