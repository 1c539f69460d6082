//! Turso/libSQL implementation of the record store.
//!
//! This module provides persistent storage using Turso (libSQL).
//! It can connect to:
//! - Remote Turso database (cloud)
//! - Local embedded SQLite file
//! - A private in-memory database (tests)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use tracing::{debug, instrument};

use evalite_models::providers::MessageOptions;

use super::{Error, InsertOutcome, RecordStore, Result};
use crate::dedup::Fingerprint;
use crate::model::{
    EvaluationTarget, Prompt, SystemPrompt, TestCase, TestResult, Variable, VariableValues,
    Workspace,
};
use crate::types::{TargetId, TestCaseId, TestResultId, WorkspaceId};

const SCHEMA_WORKSPACES: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    current_prompt_version INTEGER NOT NULL,
    active_version_numbers TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_PROMPTS: &str = r#"
CREATE TABLE IF NOT EXISTS prompts (
    workspace_id TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    variables TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (workspace_id, version_number)
)
"#;

const SCHEMA_SYSTEM_PROMPTS: &str = r#"
CREATE TABLE IF NOT EXISTS system_prompts (
    workspace_id TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (workspace_id, version_number)
)
"#;

const SCHEMA_TARGETS: &str = r#"
CREATE TABLE IF NOT EXISTS evaluation_targets (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    model_config_name TEXT NOT NULL,
    max_tokens INTEGER,
    temperature REAL,
    active INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_TEST_CASES: &str = r#"
CREATE TABLE IF NOT EXISTS test_cases (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    variable_values TEXT NOT NULL,
    has_been_evaluated INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// One row per fingerprint; the UNIQUE constraint closes the
/// check-then-insert race between concurrent evaluations.
const SCHEMA_TEST_RESULTS: &str = r#"
CREATE TABLE IF NOT EXISTS test_results (
    id TEXT PRIMARY KEY,
    test_case_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    model_config_name TEXT NOT NULL,
    prompt_version INTEGER NOT NULL,
    response TEXT NOT NULL,
    max_tokens INTEGER,
    temperature REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (test_case_id, target_id, prompt_version)
)
"#;

const INDEX_TARGETS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_targets_workspace ON evaluation_targets(workspace_id)
"#;

const INDEX_TEST_CASES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_test_cases_workspace ON test_cases(workspace_id)
"#;

const WORKSPACE_COLUMNS: &str =
    "id, name, current_prompt_version, active_version_numbers, created_at, updated_at";
const PROMPT_COLUMNS: &str = "workspace_id, version_number, content, variables, created_at";
const SYSTEM_PROMPT_COLUMNS: &str = "workspace_id, version_number, content, created_at";
const TARGET_COLUMNS: &str = "id, workspace_id, name, model_config_name, max_tokens, temperature, active, created_at, updated_at";
const TEST_CASE_COLUMNS: &str =
    "id, workspace_id, variable_values, has_been_evaluated, created_at, updated_at";
const TEST_RESULT_COLUMNS: &str = "id, test_case_id, target_id, model_config_name, prompt_version, response, max_tokens, temperature, created_at, updated_at";

/// Turso-backed record store.
///
/// Holds a single connection so that an in-memory database lives as long
/// as the store.
#[derive(Clone)]
pub struct TursoStore {
    _db: Arc<Database>,
    conn: Connection,
}

impl TursoStore {
    /// Create a new store with a local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::open(db).await
    }

    /// Create a new store connected to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        Self::open(db).await
    }

    /// Create a new in-memory store (for testing).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db).await
    }

    async fn open(db: Database) -> Result<Self> {
        let conn = db.connect()?;
        let store = Self {
            _db: Arc::new(db),
            conn,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        for statement in [
            SCHEMA_WORKSPACES,
            SCHEMA_PROMPTS,
            SCHEMA_SYSTEM_PROMPTS,
            SCHEMA_TARGETS,
            SCHEMA_TEST_CASES,
            SCHEMA_TEST_RESULTS,
            INDEX_TARGETS,
            INDEX_TEST_CASES,
        ] {
            self.conn.execute(statement, ()).await?;
        }
        debug!("record store schema ready");
        Ok(())
    }

    fn parse_workspace(row: &libsql::Row) -> Result<Workspace> {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let current: i64 = row.get(2)?;
        let active_json: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(Workspace {
            id: parse_id(&id, "workspace")?,
            name,
            current_prompt_version: to_u32(current)?,
            active_version_numbers: serde_json::from_str(&active_json)?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn parse_prompt(row: &libsql::Row) -> Result<Prompt> {
        let workspace_id: String = row.get(0)?;
        let version: i64 = row.get(1)?;
        let content: String = row.get(2)?;
        let variables_json: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        let variables: Vec<Variable> = serde_json::from_str(&variables_json)?;
        Ok(Prompt {
            workspace_id: parse_id(&workspace_id, "workspace")?,
            version_number: to_u32(version)?,
            content,
            variables,
            created_at: parse_datetime(&created_at)?,
        })
    }

    fn parse_system_prompt(row: &libsql::Row) -> Result<SystemPrompt> {
        let workspace_id: String = row.get(0)?;
        let version: i64 = row.get(1)?;
        let content: String = row.get(2)?;
        let created_at: String = row.get(3)?;

        Ok(SystemPrompt {
            workspace_id: parse_id(&workspace_id, "workspace")?,
            version_number: to_u32(version)?,
            content,
            created_at: parse_datetime(&created_at)?,
        })
    }

    fn parse_target(row: &libsql::Row) -> Result<EvaluationTarget> {
        let id: String = row.get(0)?;
        let workspace_id: String = row.get(1)?;
        let name: String = row.get(2)?;
        let model_config_name: String = row.get(3)?;
        let max_tokens: Option<i64> = row.get(4)?;
        let temperature: Option<f64> = row.get(5)?;
        let active: i64 = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(EvaluationTarget {
            id: parse_id(&id, "target")?,
            workspace_id: parse_id(&workspace_id, "workspace")?,
            name,
            model_config_name,
            message_options: message_options(max_tokens, temperature)?,
            active: active != 0,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn parse_test_case(row: &libsql::Row) -> Result<TestCase> {
        let id: String = row.get(0)?;
        let workspace_id: String = row.get(1)?;
        let values_json: String = row.get(2)?;
        let evaluated: i64 = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        let variable_values: VariableValues = serde_json::from_str(&values_json)?;
        Ok(TestCase {
            id: parse_id(&id, "test case")?,
            workspace_id: parse_id(&workspace_id, "workspace")?,
            variable_values,
            has_been_evaluated: evaluated != 0,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn parse_test_result(row: &libsql::Row) -> Result<TestResult> {
        let id: String = row.get(0)?;
        let test_case_id: String = row.get(1)?;
        let target_id: String = row.get(2)?;
        let model_config_name: String = row.get(3)?;
        let prompt_version: i64 = row.get(4)?;
        let response: String = row.get(5)?;
        let max_tokens: Option<i64> = row.get(6)?;
        let temperature: Option<f64> = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(TestResult {
            id: parse_id::<TestResultId>(&id, "test result")?,
            test_case_id: parse_id(&test_case_id, "test case")?,
            target_id: parse_id(&target_id, "target")?,
            model_config_name,
            prompt_version: to_u32(prompt_version)?,
            response,
            message_options: message_options(max_tokens, temperature)?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }
}

#[async_trait]
impl RecordStore for TursoStore {
    #[instrument(skip(self, workspace), fields(id = %workspace.id), level = "debug")]
    async fn create_workspace(&self, workspace: &Workspace) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO workspaces (id, name, current_prompt_version, active_version_numbers, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    workspace.id.to_string(),
                    workspace.name.clone(),
                    i64::from(workspace.current_prompt_version),
                    serde_json::to_string(&workspace.active_version_numbers)?,
                    format_datetime(workspace.created_at),
                    format_datetime(workspace.updated_at)
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_workspace(&self, id: WorkspaceId) -> Result<Option<Workspace>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_workspace(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, workspace), fields(id = %workspace.id), level = "debug")]
    async fn update_workspace(&self, workspace: &Workspace) -> Result<()> {
        self.conn
            .execute(
                "UPDATE workspaces SET name = ?, current_prompt_version = ?, active_version_numbers = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    workspace.name.clone(),
                    i64::from(workspace.current_prompt_version),
                    serde_json::to_string(&workspace.active_version_numbers)?,
                    format_datetime(workspace.updated_at),
                    workspace.id.to_string()
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, prompt), fields(workspace_id = %prompt.workspace_id, version = prompt.version_number), level = "debug")]
    async fn create_prompt(&self, prompt: &Prompt) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO prompts (workspace_id, version_number, content, variables, created_at) VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    prompt.workspace_id.to_string(),
                    i64::from(prompt.version_number),
                    prompt.content.clone(),
                    serde_json::to_string(&prompt.variables)?,
                    format_datetime(prompt.created_at)
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_prompt(&self, workspace_id: WorkspaceId, version: u32) -> Result<Option<Prompt>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PROMPT_COLUMNS} FROM prompts WHERE workspace_id = ? AND version_number = ?"
                ),
                libsql::params![workspace_id.to_string(), i64::from(version)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_prompt(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_prompts(&self, workspace_id: WorkspaceId) -> Result<Vec<Prompt>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PROMPT_COLUMNS} FROM prompts WHERE workspace_id = ? ORDER BY version_number ASC"
                ),
                [workspace_id.to_string()],
            )
            .await?;

        let mut prompts = Vec::new();
        while let Some(row) = rows.next().await? {
            prompts.push(Self::parse_prompt(&row)?);
        }
        Ok(prompts)
    }

    #[instrument(skip(self, prompt), fields(workspace_id = %prompt.workspace_id, version = prompt.version_number), level = "debug")]
    async fn create_system_prompt(&self, prompt: &SystemPrompt) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO system_prompts (workspace_id, version_number, content, created_at) VALUES (?, ?, ?, ?)",
                libsql::params![
                    prompt.workspace_id.to_string(),
                    i64::from(prompt.version_number),
                    prompt.content.clone(),
                    format_datetime(prompt.created_at)
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_system_prompt(
        &self,
        workspace_id: WorkspaceId,
        version: u32,
    ) -> Result<Option<SystemPrompt>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SYSTEM_PROMPT_COLUMNS} FROM system_prompts WHERE workspace_id = ? AND version_number = ?"
                ),
                libsql::params![workspace_id.to_string(), i64::from(version)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_system_prompt(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn latest_system_prompt_version(&self, workspace_id: WorkspaceId) -> Result<u32> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(MAX(version_number), 0) FROM system_prompts WHERE workspace_id = ?",
                [workspace_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => to_u32(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    #[instrument(skip(self, target), fields(id = %target.id), level = "debug")]
    async fn create_target(&self, target: &EvaluationTarget) -> Result<()> {
        let (max_tokens, temperature) = option_columns(&target.message_options);
        self.conn
            .execute(
                "INSERT INTO evaluation_targets (id, workspace_id, name, model_config_name, max_tokens, temperature, active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    target.id.to_string(),
                    target.workspace_id.to_string(),
                    target.name.clone(),
                    target.model_config_name.clone(),
                    max_tokens,
                    temperature,
                    i64::from(target.active),
                    format_datetime(target.created_at),
                    format_datetime(target.updated_at)
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_target(&self, id: TargetId) -> Result<Option<EvaluationTarget>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {TARGET_COLUMNS} FROM evaluation_targets WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_target(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_targets(&self, workspace_id: WorkspaceId) -> Result<Vec<EvaluationTarget>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM evaluation_targets WHERE workspace_id = ? ORDER BY rowid ASC"
                ),
                [workspace_id.to_string()],
            )
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(Self::parse_target(&row)?);
        }
        Ok(targets)
    }

    #[instrument(skip(self, target), fields(id = %target.id), level = "debug")]
    async fn update_target(&self, target: &EvaluationTarget) -> Result<()> {
        let (max_tokens, temperature) = option_columns(&target.message_options);
        self.conn
            .execute(
                "UPDATE evaluation_targets SET name = ?, model_config_name = ?, max_tokens = ?, temperature = ?, active = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    target.name.clone(),
                    target.model_config_name.clone(),
                    max_tokens,
                    temperature,
                    i64::from(target.active),
                    format_datetime(target.updated_at),
                    target.id.to_string()
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_target(&self, id: TargetId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM evaluation_targets WHERE id = ?", [id.to_string()])
            .await?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self, test_case), fields(id = %test_case.id), level = "debug")]
    async fn create_test_case(&self, test_case: &TestCase) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO test_cases (id, workspace_id, variable_values, has_been_evaluated, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    test_case.id.to_string(),
                    test_case.workspace_id.to_string(),
                    serde_json::to_string(&test_case.variable_values)?,
                    i64::from(test_case.has_been_evaluated),
                    format_datetime(test_case.created_at),
                    format_datetime(test_case.updated_at)
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_test_case(&self, id: TestCaseId) -> Result<Option<TestCase>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {TEST_CASE_COLUMNS} FROM test_cases WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_test_case(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, test_case), fields(id = %test_case.id), level = "debug")]
    async fn update_test_case(&self, test_case: &TestCase) -> Result<()> {
        self.conn
            .execute(
                "UPDATE test_cases SET variable_values = ?, has_been_evaluated = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    serde_json::to_string(&test_case.variable_values)?,
                    i64::from(test_case.has_been_evaluated),
                    format_datetime(test_case.updated_at),
                    test_case.id.to_string()
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn mark_test_case_evaluated(&self, id: TestCaseId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE test_cases SET has_been_evaluated = 1, updated_at = ? WHERE id = ? AND has_been_evaluated = 0",
                libsql::params![format_datetime(Utc::now()), id.to_string()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_test_cases(&self, workspace_id: WorkspaceId) -> Result<Vec<TestCase>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TEST_CASE_COLUMNS} FROM test_cases WHERE workspace_id = ? ORDER BY rowid ASC"
                ),
                [workspace_id.to_string()],
            )
            .await?;

        let mut cases = Vec::new();
        while let Some(row) = rows.next().await? {
            cases.push(Self::parse_test_case(&row)?);
        }
        Ok(cases)
    }

    #[instrument(skip(self), level = "debug")]
    async fn count_test_cases(&self, workspace_id: WorkspaceId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM test_cases WHERE workspace_id = ?",
                [workspace_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let count: i64 = row.get(0)?;
                u64::try_from(count)
                    .map_err(|_| Error::InvalidData(format!("invalid count: {}", count)))
            }
            None => Ok(0),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_test_cases(
        &self,
        workspace_id: WorkspaceId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TestCase>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TEST_CASE_COLUMNS} FROM test_cases WHERE workspace_id = ? ORDER BY rowid ASC LIMIT ? OFFSET ?"
                ),
                libsql::params![
                    workspace_id.to_string(),
                    to_i64(limit)?,
                    to_i64(offset)?
                ],
            )
            .await?;

        let mut cases = Vec::new();
        while let Some(row) = rows.next().await? {
            cases.push(Self::parse_test_case(&row)?);
        }
        Ok(cases)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_test_case(&self, id: TestCaseId) -> Result<bool> {
        self.conn
            .execute("DELETE FROM test_results WHERE test_case_id = ?", [id.to_string()])
            .await?;
        let deleted = self
            .conn
            .execute("DELETE FROM test_cases WHERE id = ?", [id.to_string()])
            .await?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_test_result(&self, fingerprint: &Fingerprint) -> Result<Option<TestResult>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TEST_RESULT_COLUMNS} FROM test_results WHERE test_case_id = ? AND target_id = ? AND prompt_version = ? LIMIT 1"
                ),
                libsql::params![
                    fingerprint.test_case_id.to_string(),
                    fingerprint.target_id.to_string(),
                    i64::from(fingerprint.prompt_version)
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_test_result(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, result), fields(id = %result.id, test_case_id = %result.test_case_id), level = "debug")]
    async fn insert_test_result(&self, result: &TestResult) -> Result<InsertOutcome> {
        let (max_tokens, temperature) = option_columns(&result.message_options);
        let inserted = self
            .conn
            .execute(
                "INSERT INTO test_results (id, test_case_id, target_id, model_config_name, prompt_version, response, max_tokens, temperature, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT (test_case_id, target_id, prompt_version) DO NOTHING",
                libsql::params![
                    result.id.to_string(),
                    result.test_case_id.to_string(),
                    result.target_id.to_string(),
                    result.model_config_name.clone(),
                    i64::from(result.prompt_version),
                    result.response.clone(),
                    max_tokens,
                    temperature,
                    format_datetime(result.created_at),
                    format_datetime(result.updated_at)
                ],
            )
            .await?;

        if inserted > 0 {
            return Ok(InsertOutcome::Inserted(result.clone()));
        }

        let fingerprint = Fingerprint::of(result);
        debug!(%fingerprint, "fingerprint already evaluated, keeping existing result");
        match self.find_test_result(&fingerprint).await? {
            Some(existing) => Ok(InsertOutcome::AlreadyEvaluated(existing)),
            None => Err(Error::InvalidData(format!(
                "insert ignored but no result stored for {}",
                fingerprint
            ))),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_test_results(&self, test_case_id: TestCaseId) -> Result<Vec<TestResult>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TEST_RESULT_COLUMNS} FROM test_results WHERE test_case_id = ? ORDER BY rowid ASC"
                ),
                [test_case_id.to_string()],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::parse_test_result(&row)?);
        }
        Ok(results)
    }
}

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidData(format!("invalid datetime: {}", s)))
}

fn parse_id<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse()
        .map_err(|_| Error::InvalidData(format!("invalid {} id: {}", what, s)))
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidData(format!("out of range: {}", value)))
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidData(format!("out of range: {}", value)))
}

fn option_columns(options: &MessageOptions) -> (Option<i64>, Option<f64>) {
    (
        options.max_tokens.map(i64::from),
        options.temperature.map(f64::from),
    )
}

fn message_options(max_tokens: Option<i64>, temperature: Option<f64>) -> Result<MessageOptions> {
    Ok(MessageOptions {
        max_tokens: max_tokens.map(to_u32).transpose()?,
        temperature: temperature.map(|t| t as f32),
    })
}
