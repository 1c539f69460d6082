//! Record store trait and implementations.
//!
//! [`RecordStore`] is the only shared mutable resource in the evaluation
//! path. It offers typed create / first-match / update / delete / count /
//! paged-find operations per entity, and one conflict-aware insert for test
//! results that enforces at most one result per fingerprint.
//!
//! The Turso implementation stores data in libSQL.

mod error;
mod turso;

pub use error::{Error, Result};
pub use turso::TursoStore;

use async_trait::async_trait;

use crate::dedup::Fingerprint;
use crate::model::{EvaluationTarget, Prompt, SystemPrompt, TestCase, TestResult, Workspace};
use crate::types::{TargetId, TestCaseId, WorkspaceId};

/// Result of [`RecordStore::insert_test_result`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The new row was written.
    Inserted(TestResult),
    /// A row with the same fingerprint already existed; it is returned as is.
    AlreadyEvaluated(TestResult),
}

impl InsertOutcome {
    /// The row now stored for the fingerprint.
    pub fn into_result(self) -> TestResult {
        match self {
            Self::Inserted(r) | Self::AlreadyEvaluated(r) => r,
        }
    }
}

/// Persistence for every entity the evaluation core touches.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Workspaces

    async fn create_workspace(&self, workspace: &Workspace) -> Result<()>;

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Option<Workspace>>;

    /// Persist name, prompt version counters and active versions.
    async fn update_workspace(&self, workspace: &Workspace) -> Result<()>;

    // Prompt versions

    async fn create_prompt(&self, prompt: &Prompt) -> Result<()>;

    async fn get_prompt(&self, workspace_id: WorkspaceId, version: u32) -> Result<Option<Prompt>>;

    async fn list_prompts(&self, workspace_id: WorkspaceId) -> Result<Vec<Prompt>>;

    async fn create_system_prompt(&self, prompt: &SystemPrompt) -> Result<()>;

    async fn get_system_prompt(
        &self,
        workspace_id: WorkspaceId,
        version: u32,
    ) -> Result<Option<SystemPrompt>>;

    /// Highest system prompt version in a workspace, 0 when none exist.
    async fn latest_system_prompt_version(&self, workspace_id: WorkspaceId) -> Result<u32>;

    // Evaluation targets

    async fn create_target(&self, target: &EvaluationTarget) -> Result<()>;

    async fn get_target(&self, id: TargetId) -> Result<Option<EvaluationTarget>>;

    /// Targets of a workspace in creation order.
    async fn list_targets(&self, workspace_id: WorkspaceId) -> Result<Vec<EvaluationTarget>>;

    async fn update_target(&self, target: &EvaluationTarget) -> Result<()>;

    /// Returns whether a row was deleted.
    async fn delete_target(&self, id: TargetId) -> Result<bool>;

    // Test cases

    async fn create_test_case(&self, test_case: &TestCase) -> Result<()>;

    async fn get_test_case(&self, id: TestCaseId) -> Result<Option<TestCase>>;

    /// Persist variable values and the evaluated flag.
    async fn update_test_case(&self, test_case: &TestCase) -> Result<()>;

    /// Flip the has-been-evaluated flag on. No-op when already set.
    async fn mark_test_case_evaluated(&self, id: TestCaseId) -> Result<()>;

    /// All test cases of a workspace in creation order.
    async fn list_test_cases(&self, workspace_id: WorkspaceId) -> Result<Vec<TestCase>>;

    async fn count_test_cases(&self, workspace_id: WorkspaceId) -> Result<u64>;

    async fn find_test_cases(
        &self,
        workspace_id: WorkspaceId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TestCase>>;

    /// Delete a test case and its results. Returns whether a row was deleted.
    async fn delete_test_case(&self, id: TestCaseId) -> Result<bool>;

    // Test results

    /// First result matching all three fingerprint fields.
    async fn find_test_result(&self, fingerprint: &Fingerprint) -> Result<Option<TestResult>>;

    /// Insert unless the fingerprint is already taken.
    async fn insert_test_result(&self, result: &TestResult) -> Result<InsertOutcome>;

    async fn list_test_results(&self, test_case_id: TestCaseId) -> Result<Vec<TestResult>>;
}
