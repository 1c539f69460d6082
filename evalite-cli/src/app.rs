//! Builds the evaluation service from loaded configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use evalite_core::{EvalService, RecordStore, TursoStore};
use evalite_models::auth::CredentialStore;
use evalite_models::{ModelConfigStore, ResponderRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ConfigLoader, EvaliteConfig, StorageConfig};

/// Load configuration and wire an [`EvalService`] from it.
pub async fn service() -> Result<EvalService> {
    let config = ConfigLoader::load()?;
    build(&config).await
}

pub async fn build(config: &EvaliteConfig) -> Result<EvalService> {
    let store = open_store(&config.storage).await?;
    let models = model_catalog(config);

    let credentials = CredentialStore::new().with_env_fallback();
    let responders = ResponderRegistry::from_credentials(&credentials, config.ollama.registered_host());
    debug!(providers = ?responders.providers(), "responders registered");

    Ok(EvalService::new(
        store,
        Arc::new(models),
        Arc::new(responders),
        config.service.clone(),
    ))
}

/// Built-in catalog with configured entries layered over it.
pub fn model_catalog(config: &EvaliteConfig) -> ModelConfigStore {
    let mut models = ModelConfigStore::builtin();
    for (name, model) in &config.models {
        if models.insert(name.clone(), model.clone()).is_some() {
            debug!(%name, "configured model overrides built-in entry");
        }
    }
    models
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn RecordStore>> {
    let store = match storage {
        StorageConfig::Local { path } => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            debug!(path = %path.display(), "opening local store");
            TursoStore::new_local(path).await?
        }
        StorageConfig::Remote { url, auth_token } => {
            debug!(%url, "opening remote store");
            TursoStore::new_remote(url, auth_token).await?
        }
    };
    Ok(Arc::new(store))
}

/// A token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupted, cancelling in-flight calls");
                token.cancel();
            }
            Err(e) => debug!(error = %e, "could not listen for Ctrl-C"),
        }
    });
    cancel
}
