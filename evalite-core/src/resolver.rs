//! Maps an evaluation target onto a model configuration and a responder.

use std::sync::Arc;

use evalite_models::providers::Responder;
use evalite_models::{ModelConfig, ModelConfigStore, ResponderRegistry};

use crate::model::EvaluationTarget;
use crate::Result;

/// What a target needs to be dispatched.
#[derive(Clone)]
pub struct Resolved {
    pub model_config: ModelConfig,
    pub responder: Arc<dyn Responder>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("model_config", &self.model_config)
            .field("responder", &self.responder.name())
            .finish()
    }
}

/// Two exact-match lookups: configuration name, then provider.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    models: Arc<ModelConfigStore>,
    responders: Arc<ResponderRegistry>,
}

impl ConfigResolver {
    pub fn new(models: Arc<ModelConfigStore>, responders: Arc<ResponderRegistry>) -> Self {
        Self { models, responders }
    }

    /// Resolve a configuration name.
    pub fn resolve_name(&self, model_config_name: &str) -> Result<Resolved> {
        let model_config = self.models.get_config(model_config_name)?.clone();
        let responder = self.responders.get_responder(model_config.provider_type)?;
        Ok(Resolved {
            model_config,
            responder,
        })
    }

    /// Resolve the configuration a target references.
    pub fn resolve(&self, target: &EvaluationTarget) -> Result<Resolved> {
        self.resolve_name(&target.model_config_name)
    }

    pub fn models(&self) -> &ModelConfigStore {
        &self.models
    }

    pub fn responders(&self) -> &ResponderRegistry {
        &self.responders
    }
}
