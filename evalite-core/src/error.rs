//! Error types for the evaluation core.

use thiserror::Error;

use crate::parser::ParseError;
use crate::storage;
use crate::types::{TargetId, TestCaseId, WorkspaceId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification surfaced to callers of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Internal,
}

/// Errors raised while evaluating prompts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),

    #[error("evaluation target not found: {0}")]
    TargetNotFound(TargetId),

    #[error("test case not found: {0}")]
    TestCaseNotFound(TestCaseId),

    #[error("prompt version {version} not found in workspace {workspace}")]
    PromptVersionNotFound { workspace: WorkspaceId, version: u32 },

    #[error("model config not found: {0}")]
    ModelConfigNotFound(String),

    #[error("no responder registered for provider: {0}")]
    ProviderNotFound(String),

    #[error("workspace {0} has no active evaluation target")]
    NoActiveTarget(WorkspaceId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The responder failed; the provider's message is kept verbatim.
    #[error("inference failed: {0}")]
    Inference(evalite_models::Error),

    #[error("failed to parse model output: {0}")]
    Parse(#[from] ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),

    #[error("operation cancelled")]
    Cancelled,

    /// A dispatch task panicked or was aborted.
    #[error("dispatch task failed: {0}")]
    Task(String),

    /// Failure of one dispatched unit, tagged with what was being run.
    #[error("target {target} ({model}) on test case {test_case_id}")]
    Unit {
        target: String,
        target_id: TargetId,
        model: String,
        test_case_id: TestCaseId,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Map onto the three caller-facing categories.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WorkspaceNotFound(_)
            | Self::TargetNotFound(_)
            | Self::TestCaseNotFound(_)
            | Self::PromptVersionNotFound { .. }
            | Self::ModelConfigNotFound(_)
            | Self::ProviderNotFound(_)
            | Self::NoActiveTarget(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Inference(_)
            | Self::Parse(_)
            | Self::Storage(_)
            | Self::Cancelled
            | Self::Task(_) => ErrorKind::Internal,
            Self::Unit { source, .. } => source.kind(),
        }
    }

    /// Strip any [`Error::Unit`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Unit { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<evalite_models::Error> for Error {
    fn from(err: evalite_models::Error) -> Self {
        match err {
            evalite_models::Error::ModelConfigNotFound(name) => Self::ModelConfigNotFound(name),
            evalite_models::Error::ProviderNotFound(provider) => Self::ProviderNotFound(provider),
            other => Self::Inference(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_failures_are_not_found() {
        assert_eq!(
            Error::WorkspaceNotFound(WorkspaceId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::NoActiveTarget(WorkspaceId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Internal);
    }

    #[test]
    fn models_error_maps_lookup_variants() {
        let err: Error = evalite_models::Error::ProviderNotFound("ollama".into()).into();
        assert!(matches!(err, Error::ProviderNotFound(ref p) if p == "ollama"));

        let err: Error = evalite_models::Error::ProviderApi("rate limited".into()).into();
        assert!(matches!(err, Error::Inference(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn unit_error_carries_context_and_delegates_kind() {
        let test_case_id = TestCaseId::new();
        let err = Error::Unit {
            target: "fast".into(),
            target_id: TargetId::new(),
            model: "gpt-4o-mini".into(),
            test_case_id,
            source: Box::new(Error::ModelConfigNotFound("gpt-4o-mini".into())),
        };

        let message = err.to_string();
        assert!(message.contains("fast"));
        assert!(message.contains(&test_case_id.to_string()));
        assert!(!message.contains("model config not found"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("model config not found"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(err.root(), Error::ModelConfigNotFound(_)));
    }
}
