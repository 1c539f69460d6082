//! OpenAI-compatible chat completions responder.
//!
//! Serves OpenAI itself and any vendor exposing the same
//! `/chat/completions` wire format (Groq, self-hosted gateways).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DeltaStream, InferRequest, Responder, StreamDelta};
use crate::auth::ApiKey;
use crate::{Error, ProviderType, Result};

/// OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Groq's OpenAI-compatible base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const DONE_EVENT: &str = "[DONE]";

// ────────────────────────────────────────────────────────────────────────────
// Wire Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionContent,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunkChoice {
    delta: ChatCompletionContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatCompletionContent {
    #[serde(default)]
    content: Option<String>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_infer(request: &'a InferRequest, stream: bool) -> Self {
        Self {
            model: &request.model_config.model_name,
            messages: request
                .messages
                .iter()
                .map(|m| ChatCompletionMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
        }
    }
}

/// Parse one server-sent-events line into a delta.
///
/// Returns `None` for comments, keep-alives and chunks carrying nothing.
fn parse_sse_line(line: &str) -> Option<Result<StreamDelta>> {
    let data = line.strip_prefix("data:")?.trim();
    if data == DONE_EVENT {
        return Some(Ok(StreamDelta {
            text: None,
            done: true,
        }));
    }

    let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(Error::Serialization(e))),
    };
    let choice = chunk.choices.into_iter().next()?;
    let text = choice.delta.content.filter(|c| !c.is_empty());
    let done = choice.finish_reason.is_some();
    if text.is_none() && !done {
        return None;
    }
    Some(Ok(StreamDelta { text, done }))
}

/// Drain every complete line from `buf`, leaving any partial trailing line.
fn drain_events(buf: &mut String) -> Vec<Result<StreamDelta>> {
    let mut out = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        if let Some(delta) = parse_sse_line(line.trim()) {
            out.push(delta);
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAiResponder
// ────────────────────────────────────────────────────────────────────────────

/// Responder for OpenAI-compatible chat completion APIs.
pub struct OpenAiResponder {
    name: &'static str,
    base_url: String,
    api_key: ApiKey,
    client: reqwest::Client,
}

impl OpenAiResponder {
    /// Responder for api.openai.com.
    pub fn openai(api_key: ApiKey) -> Self {
        Self::with_base_url(ProviderType::OpenAi, OPENAI_BASE_URL, api_key)
    }

    /// Responder for Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: ApiKey) -> Self {
        Self::with_base_url(ProviderType::Groq, GROQ_BASE_URL, api_key)
    }

    /// Responder for any compatible endpoint.
    pub fn with_base_url(
        provider: ProviderType,
        base_url: impl Into<String>,
        api_key: ApiKey,
    ) -> Self {
        Self {
            name: provider.as_str(),
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Get the base URL for this responder.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self, request: &InferRequest) -> String {
        let base = request
            .model_config
            .base_url
            .as_deref()
            .unwrap_or(&self.base_url);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    async fn post(&self, request: &InferRequest, stream: bool) -> Result<reqwest::Response> {
        let url = self.completions_url(request);
        let body = ChatCompletionRequest::from_infer(request, stream);
        debug!(provider = self.name, %url, model = body.model, stream, "sending chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "{} API returned {}: {}",
                self.name, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: InferRequest) -> Result<String> {
        let response = self.post(&request, false).await?;
        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::ProviderApi(format!("{} response missing content", self.name)))
    }

    async fn generate_stream(&self, request: InferRequest) -> Result<DeltaStream> {
        use futures_util::StreamExt;

        let response = self.post(&request, true).await?;

        let stream = response
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let events = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_events(buf)
                    }
                    Err(e) => vec![Err(Error::from(e))],
                };
                std::future::ready(Some(futures_util::stream::iter(events)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
