//! Request types shared by every responder.

use serde::{Deserialize, Serialize};

use crate::ModelConfig;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message setting context/behavior.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferMessage {
    pub role: Role,
    pub content: String,
    /// Ask providers that support prompt caching to cache this message.
    #[serde(default)]
    pub should_cache: bool,
}

impl InferMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            should_cache: false,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            should_cache: false,
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            should_cache: false,
        }
    }

    /// Set the prompt-cache hint.
    pub fn cached(mut self, should_cache: bool) -> Self {
        self.should_cache = should_cache;
        self
    }
}

/// Per-call generation options.
///
/// Stored alongside every test result as a snapshot of what was sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl MessageOptions {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        }
    }
}

/// One inference call: which model, what to send, how to sample.
#[derive(Debug, Clone, PartialEq)]
pub struct InferRequest {
    pub model_config: ModelConfig,
    pub messages: Vec<InferMessage>,
    pub options: MessageOptions,
}

impl InferRequest {
    /// Create a request with default options.
    pub fn new(model_config: ModelConfig, messages: Vec<InferMessage>) -> Self {
        Self {
            model_config,
            messages,
            options: MessageOptions::default(),
        }
    }

    /// Set the generation options.
    pub fn options(mut self, options: MessageOptions) -> Self {
        self.options = options;
        self
    }

    /// Set max tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }
}

/// A chunk of a streaming response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Text delta (incremental content).
    pub text: Option<String>,
    /// Set on the final chunk.
    pub done: bool,
}
