//! Run every test case of a workspace against its first active target.

use anyhow::Result;
use clap::Args;
use evalite_core::{EvalService, SyntheticRequest, WorkspaceId};
use tracing::info;

use super::print_results;
use crate::app;

#[derive(Args, Debug)]
pub struct SynthArgs {
    pub workspace: WorkspaceId,

    /// Prompt version to render
    #[arg(long, short = 'p')]
    pub prompt_version: u32,

    /// System prompt version to send first
    #[arg(long)]
    pub system: Option<u32>,
}

pub async fn run(args: SynthArgs, service: &EvalService) -> Result<()> {
    let request = SyntheticRequest {
        workspace_id: args.workspace,
        prompt_version: args.prompt_version,
        system_prompt_version: args.system,
    };

    let results = service
        .synthetic_generation(request, &app::cancel_on_ctrl_c())
        .await?;
    info!(
        count = results.len(),
        limit = service.config().best_effort_limit,
        "synthetic generation finished"
    );
    print_results(&results);
    Ok(())
}
