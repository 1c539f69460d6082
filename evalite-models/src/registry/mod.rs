//! Model configuration catalog and responder registry.
//!
//! Both are reference data built once at startup: the catalog maps a
//! configuration name to connection parameters, the registry maps a
//! provider to the responder that can serve it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::CredentialStore;
use crate::providers::{OllamaResponder, OpenAiResponder, Responder};
use crate::{Error, ModelConfig, ProviderType, Result};

/// Named model configurations, looked up by exact name.
#[derive(Debug, Clone, Default)]
pub struct ModelConfigStore {
    configs: BTreeMap<String, ModelConfig>,
}

impl ModelConfigStore {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of well-known hosted models.
    pub fn builtin() -> Self {
        let entries = [
            ("gpt-4o", ModelConfig::new(ProviderType::OpenAi, "gpt-4o")),
            (
                "gpt-4o-mini",
                ModelConfig::new(ProviderType::OpenAi, "gpt-4o-mini"),
            ),
            (
                "text-embedding-3-small",
                ModelConfig::new(ProviderType::OpenAi, "text-embedding-3-small").embedding(),
            ),
            (
                "llama-3.1-70b",
                ModelConfig::new(ProviderType::Groq, "llama-3.1-70b-versatile"),
            ),
            (
                "llama-3.1-8b",
                ModelConfig::new(ProviderType::Groq, "llama-3.1-8b-instant"),
            ),
            (
                "claude-3-5-sonnet",
                ModelConfig::new(ProviderType::Anthropic, "claude-3-5-sonnet-20240620"),
            ),
            (
                "gemini-1.5-flash",
                ModelConfig::new(ProviderType::Google, "gemini-1.5-flash"),
            ),
        ];

        let mut store = Self::new();
        for (name, config) in entries {
            store.insert(name, config);
        }
        store
    }

    /// Add or replace a configuration.
    pub fn insert(&mut self, name: impl Into<String>, config: ModelConfig) -> Option<ModelConfig> {
        self.configs.insert(name.into(), config)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_config(mut self, name: impl Into<String>, config: ModelConfig) -> Self {
        self.insert(name, config);
        self
    }

    /// Look up a configuration by name.
    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.configs.get(name)
    }

    /// Look up a configuration by name, failing when absent.
    pub fn get_config(&self, name: &str) -> Result<&ModelConfig> {
        self.get(name)
            .ok_or_else(|| Error::ModelConfigNotFound(name.to_string()))
    }

    /// All configuration names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    /// Iterate over `(name, config)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelConfig)> {
        self.configs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Responders keyed by provider.
#[derive(Default)]
pub struct ResponderRegistry {
    responders: HashMap<ProviderType, Arc<dyn Responder>>,
}

impl ResponderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every responder whose credentials are available.
    ///
    /// Ollama needs no credentials and is registered when `ollama_host` is set.
    pub fn from_credentials(credentials: &CredentialStore, ollama_host: Option<&str>) -> Self {
        let mut registry = Self::new();

        for provider in ProviderType::ALL {
            match provider {
                ProviderType::OpenAi | ProviderType::Groq => {
                    let Ok(key) = credentials.get(provider) else {
                        debug!(%provider, "no credentials, skipping responder");
                        continue;
                    };
                    let responder = if provider == ProviderType::Groq {
                        OpenAiResponder::groq(key)
                    } else {
                        OpenAiResponder::openai(key)
                    };
                    registry.register(provider, Arc::new(responder));
                }
                ProviderType::Ollama => {
                    if let Some(host) = ollama_host {
                        registry.register(provider, Arc::new(OllamaResponder::with_base_url(host)));
                    }
                }
                ProviderType::Anthropic | ProviderType::Google | ProviderType::Vertex => {
                    if credentials.has(provider) {
                        warn!(%provider, "credentials present but no responder is available");
                    }
                }
            }
        }

        registry
    }

    /// Register (or replace) the responder for a provider.
    pub fn register(&mut self, provider: ProviderType, responder: Arc<dyn Responder>) {
        debug!(%provider, responder = responder.name(), "registered responder");
        self.responders.insert(provider, responder);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_responder(mut self, provider: ProviderType, responder: Arc<dyn Responder>) -> Self {
        self.register(provider, responder);
        self
    }

    /// Look up the responder for a provider.
    pub fn get(&self, provider: ProviderType) -> Option<Arc<dyn Responder>> {
        self.responders.get(&provider).cloned()
    }

    /// Look up the responder for a provider, failing when none is registered.
    pub fn get_responder(&self, provider: ProviderType) -> Result<Arc<dyn Responder>> {
        self.get(provider)
            .ok_or_else(|| Error::ProviderNotFound(provider.to_string()))
    }

    /// Check whether a provider has a responder.
    pub fn contains(&self, provider: ProviderType) -> bool {
        self.responders.contains_key(&provider)
    }

    /// Registered providers, in display order.
    pub fn providers(&self) -> Vec<ProviderType> {
        ProviderType::ALL
            .into_iter()
            .filter(|p| self.contains(*p))
            .collect()
    }
}

impl std::fmt::Debug for ResponderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelType;
    use crate::providers::{DeltaStream, InferRequest};
    use async_trait::async_trait;

    struct StubResponder;

    #[async_trait]
    impl Responder for StubResponder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, _request: InferRequest) -> Result<String> {
            Ok("ok".to_string())
        }

        async fn generate_stream(&self, _request: InferRequest) -> Result<DeltaStream> {
            Ok(Box::pin(tokio_stream::empty()))
        }
    }

    #[test]
    fn builtin_catalog_contains_defaults() {
        let store = ModelConfigStore::builtin();
        assert_eq!(store.get("gpt-4o").unwrap().provider_type, ProviderType::OpenAi);
        assert!(store.get("gpt-4o-mini").is_some());
        assert_eq!(
            store.get("text-embedding-3-small").unwrap().model_type,
            ModelType::Embedding
        );
    }

    #[test]
    fn get_config_reports_missing_name() {
        let store = ModelConfigStore::new();
        let err = store.get_config("nope").unwrap_err();
        assert!(matches!(err, Error::ModelConfigNotFound(name) if name == "nope"));
    }

    #[test]
    fn insert_overrides_existing_entry() {
        let mut store = ModelConfigStore::builtin();
        let previous = store.insert(
            "gpt-4o",
            ModelConfig::new(ProviderType::OpenAi, "gpt-4o-2024-08-06"),
        );
        assert!(previous.is_some());
        assert_eq!(store.get("gpt-4o").unwrap().model_name, "gpt-4o-2024-08-06");
    }

    #[test]
    fn names_are_sorted() {
        let store = ModelConfigStore::new()
            .with_config("b", ModelConfig::new(ProviderType::Ollama, "b"))
            .with_config("a", ModelConfig::new(ProviderType::Ollama, "a"));
        assert_eq!(store.names(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn registry_lookup_by_provider() {
        let registry =
            ResponderRegistry::new().with_responder(ProviderType::Ollama, Arc::new(StubResponder));

        assert!(registry.contains(ProviderType::Ollama));
        assert!(registry.get(ProviderType::OpenAi).is_none());
        assert!(matches!(
            registry.get_responder(ProviderType::OpenAi),
            Err(Error::ProviderNotFound(_))
        ));
        assert_eq!(registry.providers(), vec![ProviderType::Ollama]);
    }

    #[test]
    fn from_credentials_registers_only_available_providers() {
        let credentials = CredentialStore::new().with_key(ProviderType::Groq, "gsk-test");
        let registry = ResponderRegistry::from_credentials(&credentials, Some("http://localhost:11434"));

        assert_eq!(
            registry.providers(),
            vec![ProviderType::Groq, ProviderType::Ollama]
        );
        assert_eq!(registry.get(ProviderType::Groq).unwrap().name(), "groq");
    }

    #[test]
    fn from_credentials_without_ollama_host_skips_ollama() {
        let registry = ResponderRegistry::from_credentials(&CredentialStore::new(), None);
        assert!(registry.providers().is_empty());
    }
}
