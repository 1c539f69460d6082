//! Domain entities persisted by the record store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evalite_models::providers::MessageOptions;

use crate::types::{TargetId, TestCaseId, TestResultId, WorkspaceId};

/// Kind of a declared prompt variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableKind {
    #[default]
    Text,
    Image,
}

/// A variable declared by a prompt version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub kind: VariableKind,
}

impl Variable {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Text,
        }
    }
}

/// Value bound to one variable of a test case. Text and image are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableValue {
    Text(String),
    Image(Vec<u8>),
}

impl VariableValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Image(_) => None,
        }
    }
}

/// Variable name to value.
pub type VariableValues = BTreeMap<String, VariableValue>;

/// A prompt-engineering workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Highest prompt version ever created. Never decremented.
    pub current_prompt_version: u32,
    pub active_version_numbers: Vec<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            name: name.into(),
            current_prompt_version: 0,
            active_version_numbers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the next prompt version and mark it active.
    pub fn create_prompt(&mut self, content: impl Into<String>, variables: Vec<Variable>) -> Prompt {
        self.current_prompt_version += 1;
        self.active_version_numbers.push(self.current_prompt_version);
        self.updated_at = Utc::now();
        Prompt {
            workspace_id: self.id,
            version_number: self.current_prompt_version,
            content: content.into(),
            variables,
            created_at: self.updated_at,
        }
    }

    /// Add or remove a version from the active set. Returns whether the set changed.
    pub fn set_version_active(&mut self, version: u32, active: bool) -> bool {
        let present = self.active_version_numbers.contains(&version);
        match (active, present) {
            (true, false) => self.active_version_numbers.push(version),
            (false, true) => self.active_version_numbers.retain(|v| *v != version),
            _ => return false,
        }
        self.updated_at = Utc::now();
        true
    }
}

/// One immutable prompt version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub workspace_id: WorkspaceId,
    pub version_number: u32,
    pub content: String,
    pub variables: Vec<Variable>,
    pub created_at: DateTime<Utc>,
}

/// One immutable system-prompt version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub workspace_id: WorkspaceId,
    pub version_number: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A named model configuration plus message options, run against test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTarget {
    pub id: TargetId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub model_config_name: String,
    pub message_options: MessageOptions,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationTarget {
    /// Create an active target.
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        model_config_name: impl Into<String>,
        message_options: MessageOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TargetId::new(),
            workspace_id,
            name: name.into(),
            model_config_name: model_config_name.into(),
            message_options,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A set of variable values to render a prompt with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestCaseId,
    pub workspace_id: WorkspaceId,
    pub variable_values: VariableValues,
    pub has_been_evaluated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestCase {
    pub fn new(workspace_id: WorkspaceId, variable_values: VariableValues) -> Self {
        Self::with_id(TestCaseId::new(), workspace_id, variable_values)
    }

    pub fn with_id(id: TestCaseId, workspace_id: WorkspaceId, variable_values: VariableValues) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id,
            variable_values,
            has_been_evaluated: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether incoming values require rewriting this case before evaluation.
    ///
    /// True when the case was never evaluated, or any incoming variable is
    /// missing here or carries a different value.
    pub fn needs_update(&self, incoming: &VariableValues) -> bool {
        if !self.has_been_evaluated {
            return true;
        }
        incoming
            .iter()
            .any(|(name, value)| self.variable_values.get(name) != Some(value))
    }
}

/// Incoming test case on an evaluate call: an id to look up, plus values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCaseInput {
    #[serde(default)]
    pub id: Option<TestCaseId>,
    #[serde(default)]
    pub variable_values: VariableValues,
}

/// One persisted model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: TestResultId,
    pub test_case_id: TestCaseId,
    pub target_id: TargetId,
    pub model_config_name: String,
    pub prompt_version: u32,
    pub response: String,
    /// Options sent with the call, captured at creation.
    pub message_options: MessageOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A page of records plus the total count matching the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total_count: u64,
    pub items: Vec<T>,
}
