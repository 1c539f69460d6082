//! The evaluation service: Evaluate, SyntheticGeneration and the workspace
//! operations that surround them.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use evalite_models::providers::{DeltaStream, InferMessage, InferRequest, MessageOptions};
use evalite_models::{ModelConfig, ModelConfigStore, ModelType, ResponderRegistry};

use crate::config::{DefaultModels, ServiceConfig};
use crate::dedup;
use crate::dispatch::{Batch, BatchPolicy, DispatchUnit, build_messages, persist};
use crate::model::{
    EvaluationTarget, Page, Prompt, SystemPrompt, TestCase, TestCaseInput, TestResult, Variable,
    VariableValue, VariableValues, Workspace,
};
use crate::parser::{GeneratedPromptOutput, GeneratedTestCaseOutput, TitleOutput, parse_response};
use crate::prompts;
use crate::resolver::ConfigResolver;
use crate::storage::RecordStore;
use crate::template::{extract_variable_names, substitute, text_variables};
use crate::types::{TargetId, TestCaseId, WorkspaceId};
use crate::{Error, Result};

/// Title used when a workspace name cannot be generated.
pub const UNTITLED: &str = "Untitled";

const TITLE_OPTIONS: MessageOptions = MessageOptions {
    max_tokens: Some(256),
    temperature: Some(0.7),
};
const PROMPT_OPTIONS: MessageOptions = MessageOptions {
    max_tokens: Some(1024),
    temperature: Some(0.3),
};
const TEST_CASE_OPTIONS: MessageOptions = MessageOptions {
    max_tokens: Some(768),
    temperature: Some(1.2),
};

/// Evaluate one test case against every active target of a workspace.
#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub workspace_id: WorkspaceId,
    pub test_case: TestCaseInput,
    pub prompt_version: u32,
    pub system_prompt_version: Option<u32>,
}

/// Run every test case of a workspace against its first active target.
#[derive(Debug, Clone)]
pub struct SyntheticRequest {
    pub workspace_id: WorkspaceId,
    pub prompt_version: u32,
    pub system_prompt_version: Option<u32>,
}

/// A catalog entry together with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedModelConfig {
    pub name: String,
    pub config: ModelConfig,
}

/// A workspace with everything hanging off it.
#[derive(Debug, Clone)]
pub struct WorkspaceDetails {
    pub workspace: Workspace,
    pub prompts: Vec<Prompt>,
    pub targets: Vec<EvaluationTarget>,
    pub test_case_count: u64,
}

/// Entry point for the evaluation core.
pub struct EvalService {
    store: Arc<dyn RecordStore>,
    models: Arc<ModelConfigStore>,
    responders: Arc<ResponderRegistry>,
    resolver: ConfigResolver,
    config: ServiceConfig,
    defaults: RwLock<DefaultModels>,
}

impl EvalService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        models: Arc<ModelConfigStore>,
        responders: Arc<ResponderRegistry>,
        config: ServiceConfig,
    ) -> Self {
        let resolver = ConfigResolver::new(models.clone(), responders.clone());
        let defaults = RwLock::new(config.default_models());
        Self {
            store,
            models,
            responders,
            resolver,
            config,
            defaults,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // === Evaluation ===

    /// Evaluate one test case against all active targets, fail-fast.
    ///
    /// Results already stored for a target are returned without a call,
    /// first and in target order; fresh results follow in completion order.
    #[instrument(skip(self, request, cancel), fields(workspace_id = %request.workspace_id, version = request.prompt_version))]
    pub async fn evaluate(
        &self,
        request: EvaluateRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<TestResult>> {
        let workspace = self.workspace(request.workspace_id).await?;
        let test_case = self
            .resolve_test_case(workspace.id, request.test_case)
            .await?;
        let prompt = self.prompt(workspace.id, request.prompt_version).await?;
        let system = self
            .system_prompt_text(workspace.id, request.system_prompt_version)
            .await?;

        let targets = self.active_targets(workspace.id).await?;
        if targets.is_empty() {
            info!("no active evaluation targets");
            return Ok(Vec::new());
        }
        let (mut results, pending) =
            dedup::partition(self.store.as_ref(), test_case.id, prompt.version_number, targets)
                .await?;
        debug!(cached = results.len(), pending = pending.len(), "dedup done");
        if pending.is_empty() {
            return Ok(results);
        }
        let should_cache = pending.len() > self.config.cache_hint_threshold;

        let rendered = substitute(&prompt.content, &text_variables(&test_case.variable_values));
        let messages = build_messages(system.as_deref(), &rendered, should_cache);
        let units = pending
            .into_iter()
            .map(|target| {
                DispatchUnit::new(test_case.id, target, prompt.version_number, messages.clone())
            })
            .collect();

        let policy = BatchPolicy::FailFast;
        let outcome = Batch::new(policy).run(&self.resolver, units, cancel).await;
        results.extend(persist(self.store.as_ref(), policy, outcome).await?);
        Ok(results)
    }

    /// Run every test case of a workspace against its first active target.
    ///
    /// Best-effort and concurrency-limited: failing cases are logged and
    /// left out. Previously stored results are returned without a call.
    #[instrument(skip(self, request, cancel), fields(workspace_id = %request.workspace_id, version = request.prompt_version))]
    pub async fn synthetic_generation(
        &self,
        request: SyntheticRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<TestResult>> {
        let workspace = self.workspace(request.workspace_id).await?;
        let prompt = self.prompt(workspace.id, request.prompt_version).await?;
        let system = self
            .system_prompt_text(workspace.id, request.system_prompt_version)
            .await?;

        let target = self
            .active_targets(workspace.id)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoActiveTarget(workspace.id))?;

        let mut results = Vec::new();
        let mut units = Vec::new();
        for case in self.store.list_test_cases(workspace.id).await? {
            let fingerprint = dedup::Fingerprint::new(case.id, target.id, prompt.version_number);
            if let Some(existing) = dedup::check(self.store.as_ref(), &fingerprint).await? {
                results.push(existing);
                continue;
            }

            let rendered = substitute(&prompt.content, &text_variables(&case.variable_values));
            let messages = build_messages(system.as_deref(), &rendered, false);
            units.push(DispatchUnit::new(
                case.id,
                target.clone(),
                prompt.version_number,
                messages,
            ));
        }
        info!(
            cached = results.len(),
            pending = units.len(),
            target = %target.name,
            "synthetic generation"
        );

        let policy = BatchPolicy::BestEffort {
            limit: self.config.best_effort_limit,
        };
        let outcome = Batch::new(policy).run(&self.resolver, units, cancel).await;
        results.extend(persist(self.store.as_ref(), policy, outcome).await?);
        Ok(results)
    }

    // === Inference pass-through ===

    /// Run a request on the responder for its provider.
    pub async fn infer(&self, request: InferRequest) -> Result<String> {
        let responder = self
            .responders
            .get_responder(request.model_config.provider_type)?;
        Ok(responder.generate(request).await?)
    }

    /// Streaming form of [`infer`](Self::infer).
    pub async fn infer_stream(&self, request: InferRequest) -> Result<DeltaStream> {
        let responder = self
            .responders
            .get_responder(request.model_config.provider_type)?;
        Ok(responder.generate_stream(request).await?)
    }

    // === Model configurations ===

    /// Catalog entries of kind LLM that have a registered responder.
    pub fn list_model_configs(&self) -> Vec<NamedModelConfig> {
        self.models
            .iter()
            .filter(|(_, config)| config.model_type == ModelType::Llm)
            .filter(|(_, config)| self.responders.contains(config.provider_type))
            .map(|(name, config)| NamedModelConfig {
                name: name.to_string(),
                config: config.clone(),
            })
            .collect()
    }

    pub async fn default_small_model(&self) -> Result<NamedModelConfig> {
        let name = self.defaults.read().await.small.clone();
        self.named_config(&name)
    }

    pub async fn default_large_model(&self) -> Result<NamedModelConfig> {
        let name = self.defaults.read().await.large.clone();
        self.named_config(&name)
    }

    /// Swap the small default. Returns the previous name.
    pub async fn set_default_small_model(&self, name: &str) -> Result<String> {
        self.models.get_config(name)?;
        let mut defaults = self.defaults.write().await;
        let previous = std::mem::replace(&mut defaults.small, name.to_string());
        info!(%previous, current = name, "default small model changed");
        Ok(previous)
    }

    /// Swap the large default. Returns the previous name.
    pub async fn set_default_large_model(&self, name: &str) -> Result<String> {
        self.models.get_config(name)?;
        let mut defaults = self.defaults.write().await;
        let previous = std::mem::replace(&mut defaults.large, name.to_string());
        info!(%previous, current = name, "default large model changed");
        Ok(previous)
    }

    fn named_config(&self, name: &str) -> Result<NamedModelConfig> {
        let config = self.models.get_config(name)?.clone();
        Ok(NamedModelConfig {
            name: name.to_string(),
            config,
        })
    }

    // === Generators ===

    /// Title a workspace from its prompt, falling back to [`UNTITLED`].
    pub async fn generate_workspace_name(&self, prompt: &str, cancel: &CancellationToken) -> String {
        let model = self.defaults.read().await.small.clone();
        let reply = match self
            .complete(&model, prompts::render_summarize(prompt), TITLE_OPTIONS, cancel)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "workspace name generation failed");
                return UNTITLED.to_string();
            }
        };

        match parse_response::<TitleOutput>(&reply) {
            Ok(out) if !out.title.is_empty() => out.title,
            Ok(_) => UNTITLED.to_string(),
            Err(e) => {
                warn!(error = %e, "could not parse generated workspace name");
                UNTITLED.to_string()
            }
        }
    }

    /// Draft a prompt template for a task. Uses the large default when no
    /// model configuration is named.
    pub async fn generate_prompt(
        &self,
        model_config_name: Option<&str>,
        task_description: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let model = match model_config_name {
            Some(name) => name.to_string(),
            None => self.defaults.read().await.large.clone(),
        };
        let reply = self
            .complete(
                &model,
                prompts::render_generate_prompt(task_description),
                PROMPT_OPTIONS,
                cancel,
            )
            .await?;
        let out: GeneratedPromptOutput = parse_response(&reply)?;
        Ok(out.prompt)
    }

    /// Invent a new test case for a prompt version and store it.
    #[instrument(skip(self, cancel))]
    pub async fn generate_test_case(
        &self,
        workspace_id: WorkspaceId,
        prompt_version: u32,
        cancel: &CancellationToken,
    ) -> Result<TestCase> {
        let workspace = self.workspace(workspace_id).await?;
        let prompt = self.prompt(workspace.id, prompt_version).await?;
        let examples = self
            .store
            .find_test_cases(workspace.id, 0, prompts::MAX_EXAMPLE_CASES as u64)
            .await?;

        let model = self.defaults.read().await.small.clone();
        let instruction =
            prompts::render_generate_test_case(&prompt.content, &prompt.variables, &examples);
        let reply = self
            .complete(&model, instruction, TEST_CASE_OPTIONS, cancel)
            .await?;
        let out: GeneratedTestCaseOutput = parse_response(&reply)?;

        let variable_values: VariableValues = out
            .test_case
            .into_iter()
            .filter(|pair| !pair.key.trim().is_empty())
            .map(|pair| {
                (
                    pair.key.trim().to_string(),
                    VariableValue::text(pair.value.trim()),
                )
            })
            .collect();

        let test_case = TestCase::new(workspace.id, variable_values);
        self.store.create_test_case(&test_case).await?;
        debug!(id = %test_case.id, "generated test case");
        Ok(test_case)
    }

    async fn complete(
        &self,
        model_config_name: &str,
        user: String,
        options: MessageOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let resolved = self.resolver.resolve_name(model_config_name)?;
        let request =
            InferRequest::new(resolved.model_config, vec![InferMessage::user(user)]).options(options);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            reply = resolved.responder.generate(request) => Ok(reply?),
        }
    }

    // === Workspaces and prompts ===

    /// Create a workspace with its first prompt version.
    ///
    /// An empty name is replaced by a generated one.
    pub async fn create_workspace(
        &self,
        name: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<(Workspace, Prompt)> {
        let name = match name.trim() {
            "" => self.generate_workspace_name(content, cancel).await,
            given => given.to_string(),
        };

        let mut workspace = Workspace::new(name);
        let prompt = workspace.create_prompt(content, declared_variables(content));
        self.store.create_workspace(&workspace).await?;
        self.store.create_prompt(&prompt).await?;
        info!(id = %workspace.id, name = %workspace.name, "workspace created");
        Ok((workspace, prompt))
    }

    pub async fn get_workspace(&self, id: WorkspaceId) -> Result<WorkspaceDetails> {
        let workspace = self.workspace(id).await?;
        let prompts = self.store.list_prompts(id).await?;
        let targets = self.store.list_targets(id).await?;
        let test_case_count = self.store.count_test_cases(id).await?;
        Ok(WorkspaceDetails {
            workspace,
            prompts,
            targets,
            test_case_count,
        })
    }

    /// Append a prompt version; it becomes active.
    pub async fn add_prompt_version(&self, workspace_id: WorkspaceId, content: &str) -> Result<Prompt> {
        let mut workspace = self.workspace(workspace_id).await?;
        let prompt = workspace.create_prompt(content, declared_variables(content));
        self.store.create_prompt(&prompt).await?;
        self.store.update_workspace(&workspace).await?;
        Ok(prompt)
    }

    /// Append a system prompt version.
    pub async fn add_system_prompt(
        &self,
        workspace_id: WorkspaceId,
        content: &str,
    ) -> Result<SystemPrompt> {
        let workspace = self.workspace(workspace_id).await?;
        let version_number = self.store.latest_system_prompt_version(workspace.id).await? + 1;
        let prompt = SystemPrompt {
            workspace_id: workspace.id,
            version_number,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_system_prompt(&prompt).await?;
        Ok(prompt)
    }

    /// Add or remove a prompt version from the workspace's active set.
    pub async fn set_version_active(
        &self,
        workspace_id: WorkspaceId,
        version: u32,
        active: bool,
    ) -> Result<Workspace> {
        let mut workspace = self.workspace(workspace_id).await?;
        if version == 0 || version > workspace.current_prompt_version {
            return Err(Error::PromptVersionNotFound {
                workspace: workspace.id,
                version,
            });
        }
        if workspace.set_version_active(version, active) {
            self.store.update_workspace(&workspace).await?;
        }
        Ok(workspace)
    }

    // === Evaluation targets ===

    /// Create an active target for a catalog configuration.
    pub async fn create_evaluation_target(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        model_config_name: &str,
        options: MessageOptions,
    ) -> Result<EvaluationTarget> {
        let workspace = self.workspace(workspace_id).await?;
        self.models.get_config(model_config_name)?;
        let target = EvaluationTarget::new(workspace.id, name, model_config_name, options);
        self.store.create_target(&target).await?;
        Ok(target)
    }

    pub async fn set_evaluation_target_active(
        &self,
        workspace_id: WorkspaceId,
        target_id: TargetId,
        active: bool,
    ) -> Result<EvaluationTarget> {
        let mut target = self.owned_target(workspace_id, target_id).await?;
        if target.active != active {
            target.active = active;
            target.updated_at = Utc::now();
            self.store.update_target(&target).await?;
        }
        Ok(target)
    }

    pub async fn delete_evaluation_target(
        &self,
        workspace_id: WorkspaceId,
        target_id: TargetId,
    ) -> Result<()> {
        self.owned_target(workspace_id, target_id).await?;
        self.store.delete_target(target_id).await?;
        Ok(())
    }

    // === Test cases ===

    pub async fn create_test_case(
        &self,
        workspace_id: WorkspaceId,
        variable_values: VariableValues,
    ) -> Result<TestCase> {
        let workspace = self.workspace(workspace_id).await?;
        let test_case = TestCase::new(workspace.id, variable_values);
        self.store.create_test_case(&test_case).await?;
        Ok(test_case)
    }

    /// One page of test cases. Pages start at 1.
    pub async fn list_test_cases(
        &self,
        workspace_id: WorkspaceId,
        page: u64,
        page_size: u64,
    ) -> Result<Page<TestCase>> {
        if page == 0 || page_size == 0 {
            return Err(Error::InvalidArgument(format!(
                "page and page size must be positive, got page {page} of size {page_size}"
            )));
        }
        let offset = (page - 1).checked_mul(page_size).ok_or_else(|| {
            Error::InvalidArgument(format!("page {page} of size {page_size} is out of range"))
        })?;
        let workspace = self.workspace(workspace_id).await?;
        let total_count = self.store.count_test_cases(workspace.id).await?;
        let items = self
            .store
            .find_test_cases(workspace.id, offset, page_size)
            .await?;
        Ok(Page { total_count, items })
    }

    /// Delete a test case and its results.
    pub async fn delete_test_case(
        &self,
        workspace_id: WorkspaceId,
        test_case_id: TestCaseId,
    ) -> Result<()> {
        let test_case = self
            .store
            .get_test_case(test_case_id)
            .await?
            .ok_or(Error::TestCaseNotFound(test_case_id))?;
        if test_case.workspace_id != workspace_id {
            return Err(Error::InvalidArgument(format!(
                "test case {test_case_id} does not belong to workspace {workspace_id}"
            )));
        }
        self.store.delete_test_case(test_case_id).await?;
        Ok(())
    }

    /// Stored results of a test case.
    pub async fn test_results(&self, test_case_id: TestCaseId) -> Result<Vec<TestResult>> {
        Ok(self.store.list_test_results(test_case_id).await?)
    }

    // === Lookups ===

    async fn workspace(&self, id: WorkspaceId) -> Result<Workspace> {
        self.store
            .get_workspace(id)
            .await?
            .ok_or(Error::WorkspaceNotFound(id))
    }

    async fn prompt(&self, workspace_id: WorkspaceId, version: u32) -> Result<Prompt> {
        self.store
            .get_prompt(workspace_id, version)
            .await?
            .ok_or(Error::PromptVersionNotFound {
                workspace: workspace_id,
                version,
            })
    }

    /// A missing system prompt version means no system prompt.
    async fn system_prompt_text(
        &self,
        workspace_id: WorkspaceId,
        version: Option<u32>,
    ) -> Result<Option<String>> {
        let Some(version) = version else {
            return Ok(None);
        };
        let prompt = self.store.get_system_prompt(workspace_id, version).await?;
        if prompt.is_none() {
            debug!(version, "system prompt version not found, sending none");
        }
        Ok(prompt.map(|p| p.content))
    }

    async fn active_targets(&self, workspace_id: WorkspaceId) -> Result<Vec<EvaluationTarget>> {
        let mut targets = self.store.list_targets(workspace_id).await?;
        targets.retain(|t| t.active);
        Ok(targets)
    }

    async fn owned_target(
        &self,
        workspace_id: WorkspaceId,
        target_id: TargetId,
    ) -> Result<EvaluationTarget> {
        let target = self
            .store
            .get_target(target_id)
            .await?
            .ok_or(Error::TargetNotFound(target_id))?;
        if target.workspace_id != workspace_id {
            return Err(Error::InvalidArgument(format!(
                "evaluation target {target_id} does not belong to workspace {workspace_id}"
            )));
        }
        Ok(target)
    }

    /// Find or lazily create the test case an evaluation refers to.
    ///
    /// The stored case takes the incoming values when it was never evaluated
    /// or any incoming value differs. The evaluated flag itself is only set
    /// once a result is stored.
    async fn resolve_test_case(
        &self,
        workspace_id: WorkspaceId,
        input: TestCaseInput,
    ) -> Result<TestCase> {
        let existing = match input.id {
            Some(id) => self.store.get_test_case(id).await?,
            None => None,
        };

        let Some(mut test_case) = existing else {
            let test_case = TestCase::with_id(
                input.id.unwrap_or_default(),
                workspace_id,
                input.variable_values,
            );
            self.store.create_test_case(&test_case).await?;
            debug!(id = %test_case.id, "created test case");
            return Ok(test_case);
        };

        if test_case.workspace_id != workspace_id {
            return Err(Error::InvalidArgument(format!(
                "test case {} does not belong to workspace {}",
                test_case.id, workspace_id
            )));
        }

        if test_case.needs_update(&input.variable_values) {
            test_case.variable_values = input.variable_values;
            test_case.updated_at = Utc::now();
            self.store.update_test_case(&test_case).await?;
            debug!(id = %test_case.id, "updated test case values");
        }
        Ok(test_case)
    }
}

/// Distinct `{{ ... }}` names of a prompt, as text variables.
fn declared_variables(content: &str) -> Vec<Variable> {
    let mut variables: Vec<Variable> = Vec::new();
    for name in extract_variable_names(content) {
        if !variables.iter().any(|v| v.name == name) {
            variables.push(Variable::text(name));
        }
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_variables_are_distinct_and_ordered() {
        let vars = declared_variables("{{B}} {{A}} {{ B }}");
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
