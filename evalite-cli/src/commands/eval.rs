//! Evaluate one test case against every active target.

use anyhow::Result;
use clap::Args;
use evalite_core::{EvalService, EvaluateRequest, TestCaseId, TestCaseInput, WorkspaceId};
use tracing::info;

use super::{VariableArgs, print_results};
use crate::app;

#[derive(Args, Debug)]
pub struct EvalArgs {
    pub workspace: WorkspaceId,

    /// Prompt version to render
    #[arg(long, short = 'p')]
    pub prompt_version: u32,

    /// System prompt version to send first
    #[arg(long)]
    pub system: Option<u32>,

    /// Existing test case; created with this id when missing
    #[arg(long)]
    pub case: Option<TestCaseId>,

    #[command(flatten)]
    pub variables: VariableArgs,
}

pub async fn run(args: EvalArgs, service: &EvalService) -> Result<()> {
    let request = EvaluateRequest {
        workspace_id: args.workspace,
        test_case: TestCaseInput {
            id: args.case,
            variable_values: args.variables.into_values()?,
        },
        prompt_version: args.prompt_version,
        system_prompt_version: args.system,
    };

    let results = service.evaluate(request, &app::cancel_on_ctrl_c()).await?;
    info!(count = results.len(), "evaluation finished");
    print_results(&results);
    Ok(())
}
