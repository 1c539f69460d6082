//! Credential lookup for provider API keys.
//!
//! Keys come from explicit overrides (e.g. a config file) first, then from
//! provider-specific environment variables.
//!
//! # Example
//!
//! ```ignore
//! use evalite_models::auth::CredentialStore;
//! use evalite_models::ProviderType;
//!
//! let store = CredentialStore::new().with_env_fallback();
//! let key = store.get(ProviderType::OpenAi)?;
//! ```

use std::collections::HashMap;
use std::env;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::{Error, ProviderType, Result};

/// A secure API key that prevents accidental logging.
///
/// The key is wrapped in `SecretString` which:
/// - Implements `Debug` as `"[REDACTED]"`
/// - Zeroizes memory on drop
/// - Requires explicit `.expose_secret()` to access the value
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Create a new API key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Expose the secret key value.
    ///
    /// Use sparingly - only when actually sending to an API.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Environment variable names for each provider that takes an API key.
const ENV_VARS: &[(ProviderType, &str)] = &[
    (ProviderType::Anthropic, "ANTHROPIC_API_KEY"),
    (ProviderType::OpenAi, "OPENAI_API_KEY"),
    (ProviderType::Google, "GOOGLE_API_KEY"),
    (ProviderType::Groq, "GROQ_API_KEY"),
];

/// Get the environment variable name for a provider.
pub fn env_var_for_provider(provider: ProviderType) -> Option<&'static str> {
    ENV_VARS
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, v)| *v)
}

/// Source of a resolved credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Set explicitly via [`CredentialStore::with_key`].
    Override,
    /// From environment variable.
    Environment,
}

/// Credential lookup with explicit overrides and environment fallback.
///
/// # Lookup Priority
///
/// 1. Explicit overrides
/// 2. Environment variables (if `env_fallback` is enabled)
#[derive(Debug, Default)]
pub struct CredentialStore {
    overrides: HashMap<ProviderType, ApiKey>,
    env_fallback: bool,
}

impl CredentialStore {
    /// Create an empty credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable environment variable fallback.
    pub fn with_env_fallback(mut self) -> Self {
        self.env_fallback = true;
        self
    }

    /// Set an explicit key for a provider.
    pub fn with_key(mut self, provider: ProviderType, key: impl Into<ApiKey>) -> Self {
        self.overrides.insert(provider, key.into());
        self
    }

    /// Get an API key for a provider.
    ///
    /// # Errors
    ///
    /// Returns `Error::CredentialsNotFound` if no credentials are found.
    pub fn get(&self, provider: ProviderType) -> Result<ApiKey> {
        if let Some(key) = self.overrides.get(&provider) {
            debug!(%provider, "using configured API key");
            return Ok(key.clone());
        }

        if self.env_fallback
            && let Some(key) = get_from_env(provider)
        {
            debug!(%provider, "retrieved API key from environment");
            return Ok(key);
        }

        Err(Error::CredentialsNotFound(provider.to_string()))
    }

    /// Check if credentials exist for a provider.
    pub fn has(&self, provider: ProviderType) -> bool {
        self.get(provider).is_ok()
    }

    /// Get the source of a credential.
    pub fn credential_source(&self, provider: ProviderType) -> Option<CredentialSource> {
        if self.overrides.contains_key(&provider) {
            Some(CredentialSource::Override)
        } else if self.env_fallback && get_from_env(provider).is_some() {
            Some(CredentialSource::Environment)
        } else {
            None
        }
    }

    /// List all providers with credentials, in display order.
    pub fn list_providers(&self) -> Vec<ProviderType> {
        ProviderType::ALL
            .into_iter()
            .filter(|p| self.has(*p))
            .collect()
    }
}

fn get_from_env(provider: ProviderType) -> Option<ApiKey> {
    let env_var = env_var_for_provider(provider)?;
    env::var(env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(ApiKey::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret-key-12345");
        let debug = format!("{:?}", key);
        assert_eq!(debug, "ApiKey([REDACTED])");
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn api_key_expose_secret_returns_value() {
        let key: ApiKey = "my-key".into();
        assert_eq!(key.expose_secret(), "my-key");
    }

    #[test]
    fn env_var_for_known_providers() {
        assert_eq!(
            env_var_for_provider(ProviderType::Anthropic),
            Some("ANTHROPIC_API_KEY")
        );
        assert_eq!(
            env_var_for_provider(ProviderType::OpenAi),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(env_var_for_provider(ProviderType::Ollama), None);
    }

    #[test]
    fn override_takes_precedence() {
        let store = CredentialStore::new().with_key(ProviderType::Groq, "gsk-override");
        assert_eq!(
            store.get(ProviderType::Groq).unwrap().expose_secret(),
            "gsk-override"
        );
        assert_eq!(
            store.credential_source(ProviderType::Groq),
            Some(CredentialSource::Override)
        );
    }

    #[test]
    #[serial]
    fn env_fallback_reads_provider_variable() {
        // SAFETY: serialized with every other env-mutating test
        unsafe { env::set_var("OPENAI_API_KEY", "test-key-from-env") };

        let store = CredentialStore::new().with_env_fallback();
        let result = store.get(ProviderType::OpenAi);
        let source = store.credential_source(ProviderType::OpenAi);

        // SAFETY: serialized with every other env-mutating test
        unsafe { env::remove_var("OPENAI_API_KEY") };

        assert_eq!(result.unwrap().expose_secret(), "test-key-from-env");
        assert_eq!(source, Some(CredentialSource::Environment));
    }

    #[test]
    #[serial]
    fn without_fallback_env_is_ignored() {
        // SAFETY: serialized with every other env-mutating test
        unsafe { env::set_var("GROQ_API_KEY", "test-key") };

        let store = CredentialStore::new();
        let result = store.get(ProviderType::Groq);

        // SAFETY: serialized with every other env-mutating test
        unsafe { env::remove_var("GROQ_API_KEY") };

        assert!(matches!(result, Err(Error::CredentialsNotFound(_))));
    }

    #[test]
    #[serial]
    fn list_providers_includes_overrides_and_env() {
        // SAFETY: serialized with every other env-mutating test
        unsafe { env::set_var("ANTHROPIC_API_KEY", "test-key") };

        let store = CredentialStore::new()
            .with_env_fallback()
            .with_key(ProviderType::Groq, "gsk");
        let providers = store.list_providers();

        // SAFETY: serialized with every other env-mutating test
        unsafe { env::remove_var("ANTHROPIC_API_KEY") };

        assert!(providers.contains(&ProviderType::Anthropic));
        assert!(providers.contains(&ProviderType::Groq));
        assert!(!providers.contains(&ProviderType::Ollama));
    }
}
