//! Fingerprint lookup deciding which targets still need inference.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{EvaluationTarget, TestResult};
use crate::storage::RecordStore;
use crate::types::{TargetId, TestCaseId};
use crate::Result;

/// Identifies at most one stored [`TestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub test_case_id: TestCaseId,
    pub target_id: TargetId,
    pub prompt_version: u32,
}

impl Fingerprint {
    pub fn new(test_case_id: TestCaseId, target_id: TargetId, prompt_version: u32) -> Self {
        Self {
            test_case_id,
            target_id,
            prompt_version,
        }
    }

    /// The fingerprint a stored result occupies.
    pub fn of(result: &TestResult) -> Self {
        Self::new(result.test_case_id, result.target_id, result.prompt_version)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/v{}",
            self.test_case_id, self.target_id, self.prompt_version
        )
    }
}

/// Look up the result already stored for `fingerprint`.
///
/// `None` means inference should proceed. Store failures are errors, never
/// treated as a miss.
pub async fn check(store: &dyn RecordStore, fingerprint: &Fingerprint) -> Result<Option<TestResult>> {
    let found = store.find_test_result(fingerprint).await?;
    if found.is_some() {
        debug!(%fingerprint, "fingerprint already evaluated");
    }
    Ok(found)
}

/// Split `targets` into results already stored for this test case and
/// prompt version, and the targets that still need a call.
///
/// Both halves keep the order of `targets`.
pub async fn partition(
    store: &dyn RecordStore,
    test_case_id: TestCaseId,
    prompt_version: u32,
    targets: Vec<EvaluationTarget>,
) -> Result<(Vec<TestResult>, Vec<EvaluationTarget>)> {
    let mut cached = Vec::new();
    let mut pending = Vec::new();

    for target in targets {
        let fingerprint = Fingerprint::new(test_case_id, target.id, prompt_version);
        match check(store, &fingerprint).await? {
            Some(result) => cached.push(result),
            None => pending.push(target),
        }
    }

    Ok((cached, pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TursoStore;
    use crate::types::{TestResultId, WorkspaceId};
    use chrono::Utc;
    use evalite_models::providers::MessageOptions;

    fn stored_result(case: TestCaseId, target: TargetId, version: u32) -> TestResult {
        let now = Utc::now();
        TestResult {
            id: TestResultId::new(),
            test_case_id: case,
            target_id: target,
            model_config_name: "gpt-4o".into(),
            prompt_version: version,
            response: "cached".into(),
            message_options: MessageOptions::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn check_misses_then_hits() {
        let store = TursoStore::new_memory().await.unwrap();
        let result = stored_result(TestCaseId::new(), TargetId::new(), 1);
        let fingerprint = Fingerprint::of(&result);

        assert!(check(&store, &fingerprint).await.unwrap().is_none());
        store.insert_test_result(&result).await.unwrap();
        let hit = check(&store, &fingerprint).await.unwrap().unwrap();
        assert_eq!(hit.id, result.id);
    }

    #[tokio::test]
    async fn partition_splits_by_prior_results() {
        let store = TursoStore::new_memory().await.unwrap();
        let workspace = WorkspaceId::new();
        let case = TestCaseId::new();
        let targets: Vec<_> = (0..3)
            .map(|i| {
                EvaluationTarget::new(workspace, format!("t{i}"), "gpt-4o", MessageOptions::default())
            })
            .collect();

        store
            .insert_test_result(&stored_result(case, targets[1].id, 2))
            .await
            .unwrap();
        // Same pair under another prompt version does not count.
        store
            .insert_test_result(&stored_result(case, targets[0].id, 1))
            .await
            .unwrap();

        let (cached, pending) = partition(&store, case, 2, targets.clone()).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].target_id, targets[1].id);
        let pending_names: Vec<_> = pending.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(pending_names, vec!["t0", "t2"]);
    }

    #[test]
    fn fingerprint_display_includes_version() {
        let fingerprint = Fingerprint::new(TestCaseId::new(), TargetId::new(), 7);
        assert!(fingerprint.to_string().ends_with("/v7"));
    }
}
