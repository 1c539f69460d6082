//! Shared test utilities for evalite-core integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use evalite_core::{
    EvalService, EvaluationTarget, RecordStore, ServiceConfig, TursoStore, VariableValue,
    VariableValues, Workspace,
};
use evalite_models::providers::{DeltaStream, InferRequest, MessageOptions, Responder, StreamDelta};
use evalite_models::{ModelConfig, ModelConfigStore, ProviderType, ResponderRegistry};

/// Model configuration names known to the test catalog.
pub const MODELS: &[&str] = &["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta"];

/// Responder that records every request.
///
/// Models listed in `failing_models` return a provider error, user prompts
/// containing `fail_marker` fail too, and every call waits `delay` first.
/// Replies are `"<model>: <user prompt>"` unless `canned_reply` is set.
#[derive(Default)]
pub struct MockResponder {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<InferRequest>>,
    pub failing_models: Vec<String>,
    pub fail_marker: Option<String>,
    pub delay: Option<Duration>,
    pub canned_reply: Option<String>,
}

impl MockResponder {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<InferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: InferRequest) -> evalite_models::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let model = request.model_config.model_name.clone();
        let user = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if self.failing_models.contains(&model) {
            return Err(evalite_models::Error::ProviderApi(format!("{model} is overloaded")));
        }
        if let Some(marker) = &self.fail_marker
            && user.contains(marker.as_str())
        {
            return Err(evalite_models::Error::ProviderApi(format!("{model} rejected input")));
        }

        Ok(match &self.canned_reply {
            Some(reply) => reply.clone(),
            None => format!("{model}: {user}"),
        })
    }

    async fn generate_stream(&self, request: InferRequest) -> evalite_models::Result<DeltaStream> {
        let text = self.generate(request).await?;
        let deltas = vec![
            Ok(StreamDelta {
                text: Some(text),
                done: false,
            }),
            Ok(StreamDelta {
                text: None,
                done: true,
            }),
        ];
        Ok(Box::pin(tokio_stream::iter(deltas)))
    }
}

pub struct Harness {
    pub service: EvalService,
    pub store: Arc<TursoStore>,
    pub responder: Arc<MockResponder>,
}

impl Harness {
    pub async fn new(responder: MockResponder) -> Self {
        Self::with_config(responder, ServiceConfig::default()).await
    }

    pub async fn with_config(responder: MockResponder, config: ServiceConfig) -> Self {
        let mut catalog = ModelConfigStore::new();
        for name in MODELS {
            catalog.insert(*name, ModelConfig::new(ProviderType::Ollama, *name));
        }
        catalog.insert("gpt-4o-mini", ModelConfig::new(ProviderType::Ollama, "small"));
        catalog.insert("gpt-4o", ModelConfig::new(ProviderType::Ollama, "large"));
        catalog.insert("hosted", ModelConfig::new(ProviderType::OpenAi, "gpt-4o"));

        let responder = Arc::new(responder);
        let registry = ResponderRegistry::new().with_responder(ProviderType::Ollama, responder.clone());
        let store = Arc::new(TursoStore::new_memory().await.unwrap());
        let service = EvalService::new(
            store.clone() as Arc<dyn RecordStore>,
            Arc::new(catalog),
            Arc::new(registry),
            config,
        );

        Self {
            service,
            store,
            responder,
        }
    }

    /// A workspace whose first prompt version is `content`.
    pub async fn workspace(&self, content: &str) -> Workspace {
        let mut workspace = Workspace::new("test");
        let prompt = workspace.create_prompt(content, vec![]);
        self.store.create_workspace(&workspace).await.unwrap();
        self.store.create_prompt(&prompt).await.unwrap();
        workspace
    }

    /// An active target named after its model.
    pub async fn target(&self, workspace: &Workspace, model: &str) -> EvaluationTarget {
        let target = EvaluationTarget::new(
            workspace.id,
            model,
            model,
            MessageOptions::new(128, 0.2),
        );
        self.store.create_target(&target).await.unwrap();
        target
    }
}

pub fn values(pairs: &[(&str, &str)]) -> VariableValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), VariableValue::text(*v)))
        .collect()
}
