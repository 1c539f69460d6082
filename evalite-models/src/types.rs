//! Core types for model configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a model vendor; responders are registered per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
    Groq,
    Vertex,
    Ollama,
}

impl ProviderType {
    /// All known providers, in display order.
    pub const ALL: [ProviderType; 6] = [
        Self::Anthropic,
        Self::OpenAi,
        Self::Google,
        Self::Groq,
        Self::Vertex,
        Self::Ollama,
    ];

    /// Convert to the string used in configuration files and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Vertex => "vertex",
            Self::Ollama => "ollama",
        }
    }

    /// Parse from the configuration string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of model a configuration points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Text generation model.
    #[default]
    Llm,
    /// Embedding model; never offered as an evaluation target.
    Embedding,
}

/// Connection parameters for one named model configuration.
///
/// Reference data: loaded once at startup and looked up by name.
///
/// # Examples
///
/// ```
/// use evalite_models::{ModelConfig, ProviderType};
///
/// let config = ModelConfig::new(ProviderType::Ollama, "llama3")
///     .base_url("http://localhost:11434");
/// assert_eq!(config.model_name, "llama3");
/// assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider serving this model.
    #[serde(rename = "provider")]
    pub provider_type: ProviderType,
    /// Model name as the provider knows it.
    #[serde(rename = "model")]
    pub model_name: String,
    /// Endpoint override (self-hosted or OpenAI-compatible gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model_type: ModelType,
}

impl ModelConfig {
    /// Create an LLM configuration without a base URL override.
    pub fn new(provider_type: ProviderType, model_name: impl Into<String>) -> Self {
        Self {
            provider_type,
            model_name: model_name.into(),
            base_url: None,
            model_type: ModelType::Llm,
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Mark as an embedding model.
    pub fn embedding(mut self) -> Self {
        self.model_type = ModelType::Embedding;
        self
    }
}
