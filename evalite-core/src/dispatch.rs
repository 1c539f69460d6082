//! Concurrent inference dispatch and result aggregation.
//!
//! A [`Batch`] runs one task per [`DispatchUnit`] inside a
//! [`JoinSet`](tokio::task::JoinSet) and always drains every task before
//! returning. Two policies share the same machinery:
//!
//! - [`BatchPolicy::FailFast`]: no concurrency bound; the first failure
//!   cancels the siblings that are still running.
//! - [`BatchPolicy::BestEffort`]: at most `limit` calls in flight; failures
//!   are collected and the rest keep going.
//!
//! Nothing is written while calls run. [`persist`] turns a [`BatchOutcome`]
//! into stored results after the join, so a fail-fast batch with any
//! failure leaves the store untouched.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use evalite_models::providers::{InferMessage, InferRequest, MessageOptions};

use crate::model::{EvaluationTarget, TestResult};
use crate::resolver::ConfigResolver;
use crate::storage::RecordStore;
use crate::types::{TargetId, TestCaseId, TestResultId};
use crate::{Error, Result};

/// How a batch reacts to a failing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Unbounded; any failure fails the whole batch.
    FailFast,
    /// At most `limit` calls in flight; failures are skipped.
    BestEffort { limit: usize },
}

impl BatchPolicy {
    fn limit(&self) -> Option<usize> {
        match self {
            Self::FailFast => None,
            Self::BestEffort { limit } => Some((*limit).max(1)),
        }
    }
}

/// One inference call to make: a target applied to a rendered test case.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub test_case_id: TestCaseId,
    pub target: EvaluationTarget,
    pub prompt_version: u32,
    pub messages: Vec<InferMessage>,
}

impl DispatchUnit {
    pub fn new(
        test_case_id: TestCaseId,
        target: EvaluationTarget,
        prompt_version: u32,
        messages: Vec<InferMessage>,
    ) -> Self {
        Self {
            test_case_id,
            target,
            prompt_version,
            messages,
        }
    }

    fn fail(&self, model: &str, source: Error) -> Failure {
        Failure {
            test_case_id: self.test_case_id,
            target_id: self.target.id,
            target: self.target.name.clone(),
            model: model.to_string(),
            error: source,
        }
    }
}

/// A unit whose call returned a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub test_case_id: TestCaseId,
    pub target_id: TargetId,
    pub target_name: String,
    pub model_config_name: String,
    pub prompt_version: u32,
    pub message_options: MessageOptions,
    pub response: String,
}

impl Completed {
    /// A fresh result row capturing the options that were sent.
    pub fn into_test_result(self) -> TestResult {
        let now = Utc::now();
        TestResult {
            id: TestResultId::new(),
            test_case_id: self.test_case_id,
            target_id: self.target_id,
            model_config_name: self.model_config_name,
            prompt_version: self.prompt_version,
            response: self.response,
            message_options: self.message_options,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A unit that did not produce a stored result.
#[derive(Debug)]
pub struct Failure {
    pub test_case_id: TestCaseId,
    pub target_id: TargetId,
    pub target: String,
    pub model: String,
    pub error: Error,
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Unit {
            target: failure.target,
            target_id: failure.target_id,
            model: failure.model,
            test_case_id: failure.test_case_id,
            source: Box::new(failure.error),
        }
    }
}

/// Everything a drained batch produced, in completion order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: Vec<Completed>,
    pub failures: Vec<Failure>,
}

/// Structured task group for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Batch {
    policy: BatchPolicy,
}

impl Batch {
    pub fn new(policy: BatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Run every unit and wait for all of them.
    ///
    /// `cancel` is the caller's signal; every in-flight call observes it.
    /// In fail-fast mode the first failure is reported first and the
    /// cancellations it triggers in siblings are not reported at all.
    pub async fn run(
        &self,
        resolver: &ConfigResolver,
        units: Vec<DispatchUnit>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if units.is_empty() {
            return outcome;
        }

        let batch_cancel = cancel.child_token();
        let semaphore = self.policy.limit().map(|n| Arc::new(Semaphore::new(n)));
        info!(units = units.len(), policy = ?self.policy, "dispatching batch");

        let mut tasks = JoinSet::new();
        for unit in units {
            tasks.spawn(run_unit(
                unit,
                resolver.clone(),
                semaphore.clone(),
                batch_cancel.clone(),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => Err(Failure {
                    test_case_id: TestCaseId::default(),
                    target_id: TargetId::default(),
                    target: String::from("<unknown>"),
                    model: String::from("<unknown>"),
                    error: Error::Task(join_error.to_string()),
                }),
            };

            match result {
                Ok(completed) => {
                    debug!(
                        test_case_id = %completed.test_case_id,
                        target_id = %completed.target_id,
                        "unit completed"
                    );
                    outcome.completed.push(completed);
                }
                Err(failure) => {
                    if self.policy == BatchPolicy::FailFast {
                        if !outcome.failures.is_empty()
                            && matches!(failure.error, Error::Cancelled)
                        {
                            continue;
                        }
                        batch_cancel.cancel();
                    }
                    outcome.failures.push(failure);
                }
            }
        }

        info!(
            completed = outcome.completed.len(),
            failed = outcome.failures.len(),
            "batch drained"
        );
        outcome
    }
}

async fn run_unit(
    unit: DispatchUnit,
    resolver: ConfigResolver,
    semaphore: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
) -> std::result::Result<Completed, Failure> {
    let model = unit.target.model_config_name.clone();

    let _permit = match semaphore {
        Some(semaphore) => {
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(unit.fail(&model, Error::Cancelled)),
                permit = semaphore.acquire_owned() => permit,
            };
            match acquired {
                Ok(permit) => Some(permit),
                Err(_) => return Err(unit.fail(&model, Error::Cancelled)),
            }
        }
        None => None,
    };

    let resolved = resolver
        .resolve(&unit.target)
        .map_err(|e| unit.fail(&model, e))?;
    let options = unit.target.message_options;
    let request = InferRequest::new(resolved.model_config, unit.messages.clone()).options(options);

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(unit.fail(&model, Error::Cancelled)),
        response = resolved.responder.generate(request) => response,
    };

    match response {
        Ok(response) => Ok(Completed {
            test_case_id: unit.test_case_id,
            target_id: unit.target.id,
            target_name: unit.target.name,
            model_config_name: model,
            prompt_version: unit.prompt_version,
            message_options: options,
            response,
        }),
        Err(e) => Err(unit.fail(&model, Error::Inference(e))),
    }
}

/// System message first when present, then the user prompt.
pub fn build_messages(system: Option<&str>, user: &str, should_cache: bool) -> Vec<InferMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(InferMessage::system(system).cached(should_cache));
    }
    messages.push(InferMessage::user(user).cached(should_cache));
    messages
}

/// Store the results of a drained batch.
///
/// Fail-fast returns the first failure and writes nothing. Best-effort logs
/// and skips failed units, including units whose write fails. Every stored
/// result marks its test case as evaluated. When the fingerprint was taken
/// by a concurrent writer, the row already stored is returned instead.
pub async fn persist(
    store: &dyn RecordStore,
    policy: BatchPolicy,
    outcome: BatchOutcome,
) -> Result<Vec<TestResult>> {
    let BatchOutcome {
        completed,
        failures,
    } = outcome;

    match policy {
        BatchPolicy::FailFast => {
            if let Some(failure) = failures.into_iter().next() {
                return Err(failure.into());
            }
        }
        BatchPolicy::BestEffort { .. } => {
            for failure in failures {
                error!(
                    test_case_id = %failure.test_case_id,
                    target = %failure.target,
                    model = %failure.model,
                    error = %failure.error,
                    "unit failed, skipping"
                );
            }
        }
    }

    let mut stored = Vec::with_capacity(completed.len());
    for unit in completed {
        let test_case_id = unit.test_case_id;
        let target_id = unit.target_id;
        let target = unit.target_name.clone();
        let model = unit.model_config_name.clone();

        match store_one(store, unit).await {
            Ok(result) => stored.push(result),
            Err(e) if policy == BatchPolicy::FailFast => {
                return Err(Error::Unit {
                    target,
                    target_id,
                    model,
                    test_case_id,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                error!(
                    %test_case_id,
                    %target,
                    %model,
                    error = %e,
                    "failed to store result, skipping"
                );
            }
        }
    }

    Ok(stored)
}

async fn store_one(store: &dyn RecordStore, completed: Completed) -> Result<TestResult> {
    let test_case_id = completed.test_case_id;
    let result = store
        .insert_test_result(&completed.into_test_result())
        .await?
        .into_result();
    store.mark_test_case_evaluated(test_case_id).await?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TursoStore;
    use crate::types::WorkspaceId;
    use async_trait::async_trait;
    use evalite_models::providers::{DeltaStream, Responder, Role};
    use evalite_models::{ModelConfig, ModelConfigStore, ProviderType, ResponderRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the model name; fails for models starting with "fail",
    /// hangs for models starting with "slow".
    #[derive(Default)]
    struct ScriptedResponder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: InferRequest) -> evalite_models::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let model = request.model_config.model_name.clone();
            let delay = if model.starts_with("slow") {
                Duration::from_secs(30)
            } else {
                Duration::from_millis(20)
            };
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if model.starts_with("fail") {
                Err(evalite_models::Error::ProviderApi(format!("{model} exploded")))
            } else {
                Ok(format!("reply from {model}"))
            }
        }

        async fn generate_stream(&self, _request: InferRequest) -> evalite_models::Result<DeltaStream> {
            Ok(Box::pin(tokio_stream::empty()))
        }
    }

    fn setup(models: &[&str]) -> (ConfigResolver, Arc<ScriptedResponder>) {
        let mut catalog = ModelConfigStore::new();
        for name in models {
            catalog.insert(*name, ModelConfig::new(ProviderType::Ollama, *name));
        }
        let responder = Arc::new(ScriptedResponder::default());
        let registry = ResponderRegistry::new().with_responder(ProviderType::Ollama, responder.clone());
        (
            ConfigResolver::new(Arc::new(catalog), Arc::new(registry)),
            responder,
        )
    }

    fn unit(case: TestCaseId, model: &str) -> DispatchUnit {
        let target = EvaluationTarget::new(
            WorkspaceId::new(),
            format!("target-{model}"),
            model,
            MessageOptions::new(64, 0.1),
        );
        DispatchUnit::new(case, target, 1, build_messages(None, "hi", false))
    }

    #[test]
    fn build_messages_puts_system_first() {
        let messages = build_messages(Some("be brief"), "hello", true);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].role, Role::User);
        assert!(messages.iter().all(|m| m.should_cache));

        let messages = build_messages(None, "hello", false);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn fail_fast_runs_all_units() {
        let (resolver, responder) = setup(&["a", "b", "c"]);
        let case = TestCaseId::new();
        let units = vec![unit(case, "a"), unit(case, "b"), unit(case, "c")];

        let outcome = Batch::new(BatchPolicy::FailFast)
            .run(&resolver, units, &CancellationToken::new())
            .await;

        assert_eq!(outcome.completed.len(), 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(responder.calls.load(Ordering::SeqCst), 3);
        assert!(outcome.completed.iter().all(|c| c.message_options.max_tokens == Some(64)));
    }

    #[tokio::test]
    async fn fail_fast_cancels_slow_siblings() {
        let (resolver, _) = setup(&["fail-b", "slow-a"]);
        let case = TestCaseId::new();
        let units = vec![unit(case, "slow-a"), unit(case, "fail-b")];

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            Batch::new(BatchPolicy::FailFast).run(&resolver, units, &CancellationToken::new()),
        )
        .await
        .expect("batch should stop once a unit fails");

        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].model, "fail-b");
        assert!(matches!(outcome.failures[0].error, Error::Inference(_)));
    }

    #[tokio::test]
    async fn best_effort_respects_limit_and_keeps_going() {
        let models = ["m1", "m2", "fail-3", "m4", "m5"];
        let (resolver, responder) = setup(&models);
        let units = models.iter().map(|m| unit(TestCaseId::new(), m)).collect();

        let outcome = Batch::new(BatchPolicy::BestEffort { limit: 2 })
            .run(&resolver, units, &CancellationToken::new())
            .await;

        assert_eq!(outcome.completed.len(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(responder.calls.load(Ordering::SeqCst), 5);
        assert!(responder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn unresolvable_target_fails_only_its_unit() {
        let (resolver, responder) = setup(&["known"]);
        let units = vec![unit(TestCaseId::new(), "known"), unit(TestCaseId::new(), "unknown")];

        let outcome = Batch::new(BatchPolicy::BestEffort { limit: 2 })
            .run(&resolver, units, &CancellationToken::new())
            .await;

        assert_eq!(outcome.completed.len(), 1);
        assert!(matches!(outcome.failures[0].error, Error::ModelConfigNotFound(_)));
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caller_cancellation_reaches_every_call() {
        let (resolver, _) = setup(&["slow-1", "slow-2"]);
        let units = vec![unit(TestCaseId::new(), "slow-1"), unit(TestCaseId::new(), "slow-2")];
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            Batch::new(BatchPolicy::BestEffort { limit: 4 }).run(&resolver, units, &cancel),
        )
        .await
        .expect("cancellation should end the batch");

        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures.iter().all(|f| matches!(f.error, Error::Cancelled)));
    }

    #[tokio::test]
    async fn persist_fail_fast_writes_nothing_on_failure() {
        let store = TursoStore::new_memory().await.unwrap();
        let (resolver, _) = setup(&["ok", "fail-x"]);
        let case = TestCaseId::new();
        let units = vec![unit(case, "ok"), unit(case, "fail-x")];

        let outcome = Batch::new(BatchPolicy::FailFast)
            .run(&resolver, units, &CancellationToken::new())
            .await;
        let err = persist(&store, BatchPolicy::FailFast, outcome)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unit { ref model, .. } if model == "fail-x"));
        assert!(store.list_test_results(case).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_best_effort_stores_successes() {
        let store = TursoStore::new_memory().await.unwrap();
        let (resolver, _) = setup(&["ok", "fail-x"]);
        let units = vec![unit(TestCaseId::new(), "ok"), unit(TestCaseId::new(), "fail-x")];

        let outcome = Batch::new(BatchPolicy::BestEffort { limit: 2 })
            .run(&resolver, units, &CancellationToken::new())
            .await;
        let stored = persist(&store, BatchPolicy::BestEffort { limit: 2 }, outcome)
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].response, "reply from ok");
        assert_eq!(stored[0].message_options, MessageOptions::new(64, 0.1));
    }
}
