use std::collections::BTreeMap;
use std::path::PathBuf;

use evalite_core::ServiceConfig;
use evalite_models::ModelConfig;
use serde::{Deserialize, Serialize};

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvaliteConfig {
    #[serde(default)]
    pub storage: RawStorageConfig,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub ollama: RawOllamaConfig,

    /// Extra model configurations, keyed by catalog name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStorageConfig {
    /// Local database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Remote libSQL database URL; takes precedence over `path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_small_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_large_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_effort_limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hint_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOllamaConfig {
    /// Register the Ollama responder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct EvaliteConfig {
    pub storage: StorageConfig,
    pub service: ServiceConfig,
    pub ollama: OllamaConfig,
    pub models: BTreeMap<String, ModelConfig>,
}

/// Where the record store lives
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Local { path: PathBuf },
    Remote { url: String, auth_token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub enabled: bool,
    pub host: String,
}

impl OllamaConfig {
    /// Host to register the responder with, if enabled.
    pub fn registered_host(&self) -> Option<&str> {
        self.enabled.then_some(self.host.as_str())
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalite_models::ProviderType;

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawEvaliteConfig = toml::from_str("").unwrap();

        assert!(raw.storage.path.is_none());
        assert!(raw.storage.url.is_none());
        assert!(raw.service.default_small_model.is_none());
        assert!(raw.ollama.enabled.is_none());
        assert!(raw.models.is_empty());
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[service]
best_effort_limit = 4

[ollama]
host = "http://gpu-box:11434"

[models.local-mistral]
provider = "ollama"
model = "mistral"
"#;
        let raw: RawEvaliteConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.service.best_effort_limit, Some(4));
        assert!(raw.service.default_large_model.is_none());
        assert_eq!(raw.ollama.host.as_deref(), Some("http://gpu-box:11434"));

        let mistral = &raw.models["local-mistral"];
        assert_eq!(mistral.provider_type, ProviderType::Ollama);
        assert_eq!(mistral.model_name, "mistral");
    }

    #[test]
    fn test_unset_fields_are_not_written() {
        let raw = RawEvaliteConfig {
            service: RawServiceConfig {
                default_small_model: Some("llama3".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let written = toml::to_string_pretty(&raw).unwrap();
        assert!(written.contains("default_small_model = \"llama3\""));
        assert!(!written.contains("best_effort_limit"));
        assert!(!written.contains("[models"));
    }

    #[test]
    fn test_disabled_ollama_has_no_host() {
        let ollama = OllamaConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(ollama.registered_host().is_none());
        assert_eq!(
            OllamaConfig::default().registered_host(),
            Some(DEFAULT_OLLAMA_HOST)
        );
    }
}
