//! Evaluation dispatch core for evalite.
//!
//! Given a versioned prompt template, a test case's variable values and the
//! active evaluation targets of a workspace, this crate renders the prompt,
//! skips targets that already have a stored result, calls the rest
//! concurrently and stores each new response exactly once.
//!
//! # Architecture
//!
//! ```text
//! template ──▶ dedup ──▶ resolver ──▶ dispatch (Batch) ──▶ persist
//!                │                                           │
//!                └───────────── RecordStore (libSQL) ◀───────┘
//! ```
//!
//! - [`template`] substitutes `{{NAME}}` placeholders
//! - [`dedup`] looks up prior results by [`Fingerprint`]
//! - [`resolver`] maps a target onto a model configuration and responder
//! - [`dispatch`] runs a fail-fast or best-effort [`Batch`] and stores results
//! - [`parser`] decodes tagged model replies into typed records
//! - [`EvalService`] ties them together

mod config;
mod error;
mod model;
mod types;

pub mod dedup;
pub mod dispatch;
pub mod parser;
pub mod prompts;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod template;

pub use config::{DefaultModels, ServiceConfig};
pub use error::{Error, ErrorKind, Result};

pub use dedup::Fingerprint;
pub use dispatch::{Batch, BatchOutcome, BatchPolicy, Completed, DispatchUnit, Failure};
pub use resolver::{ConfigResolver, Resolved};
pub use service::{EvalService, EvaluateRequest, NamedModelConfig, SyntheticRequest, WorkspaceDetails};
pub use storage::{InsertOutcome, RecordStore, TursoStore};

pub use model::{
    EvaluationTarget, Page, Prompt, SystemPrompt, TestCase, TestCaseInput, TestResult, Variable,
    VariableKind, VariableValue, VariableValues, Workspace,
};
pub use types::{TargetId, TestCaseId, TestResultId, WorkspaceId};
