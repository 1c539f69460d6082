use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use evalite_core::ServiceConfig;

use super::types::{
    EvaliteConfig, OllamaConfig, RawEvaliteConfig, RawOllamaConfig, RawServiceConfig,
    RawStorageConfig, StorageConfig,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<EvaliteConfig> {
        Self::load_layers(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Load the user file, then the project file over it
    pub fn load_layers(user_path: &Path, project_path: &Path) -> Result<EvaliteConfig> {
        let mut raw = RawEvaliteConfig::default();

        // Layer 1: User config
        if let Some(user_config) = Self::read_raw(user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/evalite/config.toml`)
    pub fn user_config_path() -> PathBuf {
        evalite_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with EVALITE_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("EVALITE_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".evalite/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<Option<RawEvaliteConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawEvaliteConfig, overlay: RawEvaliteConfig) -> RawEvaliteConfig {
        let mut models = base.models;
        models.extend(overlay.models);

        RawEvaliteConfig {
            storage: RawStorageConfig {
                path: overlay.storage.path.or(base.storage.path),
                url: overlay.storage.url.or(base.storage.url),
                auth_token: overlay.storage.auth_token.or(base.storage.auth_token),
            },
            service: RawServiceConfig {
                default_small_model: overlay
                    .service
                    .default_small_model
                    .or(base.service.default_small_model),
                default_large_model: overlay
                    .service
                    .default_large_model
                    .or(base.service.default_large_model),
                best_effort_limit: overlay
                    .service
                    .best_effort_limit
                    .or(base.service.best_effort_limit),
                cache_hint_threshold: overlay
                    .service
                    .cache_hint_threshold
                    .or(base.service.cache_hint_threshold),
            },
            ollama: RawOllamaConfig {
                enabled: overlay.ollama.enabled.or(base.ollama.enabled),
                host: overlay.ollama.host.or(base.ollama.host),
            },
            models,
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawEvaliteConfig) -> EvaliteConfig {
        let storage = match raw.storage.url {
            Some(url) => StorageConfig::Remote {
                url,
                auth_token: raw.storage.auth_token.unwrap_or_default(),
            },
            None => StorageConfig::Local {
                path: raw
                    .storage
                    .path
                    .unwrap_or_else(evalite_paths::database_path),
            },
        };

        let defaults = ServiceConfig::default();
        let service = ServiceConfig {
            default_small_model: raw
                .service
                .default_small_model
                .unwrap_or(defaults.default_small_model),
            default_large_model: raw
                .service
                .default_large_model
                .unwrap_or(defaults.default_large_model),
            best_effort_limit: raw
                .service
                .best_effort_limit
                .unwrap_or(defaults.best_effort_limit),
            cache_hint_threshold: raw
                .service
                .cache_hint_threshold
                .unwrap_or(defaults.cache_hint_threshold),
        };

        let default_ollama = OllamaConfig::default();
        let ollama = OllamaConfig {
            enabled: raw.ollama.enabled.unwrap_or(default_ollama.enabled),
            host: raw.ollama.host.unwrap_or(default_ollama.host),
        };

        EvaliteConfig {
            storage,
            service,
            ollama,
            models: raw.models,
        }
    }

    /// Apply `edit` to the raw user config and write it back
    pub fn update_user_config(edit: impl FnOnce(&mut RawEvaliteConfig)) -> Result<PathBuf> {
        let path = Self::user_config_path();
        Self::update_at(&path, edit)?;
        Ok(path)
    }

    /// Read-modify-write a single config file, keeping keys it does not touch
    ///
    /// Creates parent directories if they don't exist.
    pub fn update_at(path: &Path, edit: impl FnOnce(&mut RawEvaliteConfig)) -> Result<()> {
        let mut raw = Self::read_raw(path)?.unwrap_or_default();
        edit(&mut raw);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(&raw)?;
        std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalite_models::{ModelConfig, ProviderType};
    use serial_test::serial;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_layers(
            &temp_dir.path().join("user.toml"),
            &temp_dir.path().join("project.toml"),
        )
        .unwrap();

        assert_eq!(config.service, ServiceConfig::default());
        assert_eq!(config.ollama, OllamaConfig::default());
        assert!(config.models.is_empty());
        assert!(matches!(
            config.storage,
            StorageConfig::Local { ref path } if path.ends_with("evalite.db")
        ));
    }

    #[test]
    fn test_project_overrides_only_set_keys() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            &temp_dir,
            "user.toml",
            r#"
[service]
default_small_model = "llama3"
best_effort_limit = 8

[models.llama3]
provider = "ollama"
model = "llama3:8b"
"#,
        );
        let project = write(
            &temp_dir,
            "project.toml",
            r#"
[service]
best_effort_limit = 1

[storage]
path = "/tmp/project.db"

[models.fast]
provider = "groq"
model = "llama-3.1-8b-instant"
"#,
        );

        let config = ConfigLoader::load_layers(&user, &project).unwrap();

        assert_eq!(config.service.default_small_model, "llama3");
        assert_eq!(config.service.best_effort_limit, 1);
        assert_eq!(config.service.default_large_model, "gpt-4o");
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                path: PathBuf::from("/tmp/project.db")
            }
        );
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models["fast"].provider_type, ProviderType::Groq);
    }

    #[test]
    fn test_url_selects_remote_storage() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            &temp_dir,
            "user.toml",
            r#"
[storage]
path = "/ignored.db"
url = "libsql://evals.turso.io"
auth_token = "secret"
"#,
        );

        let config = ConfigLoader::load_layers(&user, &temp_dir.path().join("none.toml")).unwrap();

        assert_eq!(
            config.storage,
            StorageConfig::Remote {
                url: "libsql://evals.turso.io".to_string(),
                auth_token: "secret".to_string(),
            }
        );
    }

    #[test]
    fn test_merge_raw_none_preserves_base() {
        let base = RawEvaliteConfig {
            ollama: RawOllamaConfig {
                enabled: Some(false),
                host: Some("http://base:11434".to_string()),
            },
            ..Default::default()
        };
        let overlay = RawEvaliteConfig {
            ollama: RawOllamaConfig {
                enabled: None,
                host: Some("http://overlay:11434".to_string()),
            },
            ..Default::default()
        };

        let merged = ConfigLoader::merge_raw(base, overlay);

        assert_eq!(merged.ollama.enabled, Some(false));
        assert_eq!(merged.ollama.host.as_deref(), Some("http://overlay:11434"));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(&temp_dir, "user.toml", "this is not valid toml {{{{");

        let result = ConfigLoader::load_layers(&user, &temp_dir.path().join("none.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_keeps_untouched_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            &temp_dir,
            "config.toml",
            r#"
[ollama]
host = "http://gpu-box:11434"

[models.local]
provider = "ollama"
model = "qwen2"
"#,
        );

        ConfigLoader::update_at(&path, |raw| {
            raw.service.default_large_model = Some("local".to_string());
        })
        .unwrap();

        let config = ConfigLoader::load_layers(&path, &temp_dir.path().join("none.toml")).unwrap();
        assert_eq!(config.service.default_large_model, "local");
        assert_eq!(config.ollama.host, "http://gpu-box:11434");
        assert_eq!(
            config.models["local"],
            ModelConfig::new(ProviderType::Ollama, "qwen2")
        );
    }

    #[test]
    fn test_update_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("deep").join("config.toml");

        ConfigLoader::update_at(&path, |raw| raw.service.best_effort_limit = Some(3)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("best_effort_limit = 3"));
    }

    #[test]
    #[serial]
    fn test_project_config_path_honors_env() {
        // SAFETY: serialized with every other env-touching test
        unsafe { std::env::set_var("EVALITE_PROJECT_CONFIG_DIR", "/tmp/evalite-e2e") };
        let overridden = ConfigLoader::project_config_path();
        unsafe { std::env::remove_var("EVALITE_PROJECT_CONFIG_DIR") };

        assert_eq!(overridden, PathBuf::from("/tmp/evalite-e2e/config.toml"));
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".evalite/config.toml")
        );
    }

    #[test]
    #[serial]
    fn test_user_config_path_is_under_config_dir() {
        let path = ConfigLoader::user_config_path();
        assert!(path.ends_with("evalite/config.toml"));
    }
}
