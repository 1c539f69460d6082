//! Service configuration.

use serde::{Deserialize, Serialize};

/// Tunables for [`EvalService`](crate::EvalService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Model configuration used for cheap helper calls (titles, test cases).
    pub default_small_model: String,
    /// Model configuration used for prompt generation when none is given.
    pub default_large_model: String,
    /// Simultaneous inference calls during synthetic generation.
    pub best_effort_limit: usize,
    /// Prompt-cache hint is set when a batch has more targets than this.
    pub cache_hint_threshold: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_small_model: "gpt-4o-mini".to_string(),
            default_large_model: "gpt-4o".to_string(),
            best_effort_limit: 2,
            cache_hint_threshold: 5,
        }
    }
}

impl ServiceConfig {
    pub(crate) fn default_models(&self) -> DefaultModels {
        DefaultModels {
            small: self.default_small_model.clone(),
            large: self.default_large_model.clone(),
        }
    }
}

/// The swappable pair of default model-configuration names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultModels {
    pub small: String,
    pub large: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: ServiceConfig = from_json(r#"{"best_effort_limit": 4}"#);
        assert_eq!(config.best_effort_limit, 4);
        assert_eq!(config.default_small_model, "gpt-4o-mini");
        assert_eq!(config.cache_hint_threshold, 5);
    }

    fn from_json(json: &str) -> ServiceConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn default_models_mirror_config() {
        let models = ServiceConfig::default().default_models();
        assert_eq!(models.small, "gpt-4o-mini");
        assert_eq!(models.large, "gpt-4o");
    }
}
