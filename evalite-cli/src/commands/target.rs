//! Evaluation target commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use evalite_core::{EvalService, TargetId, WorkspaceId};
use evalite_models::providers::MessageOptions;

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[command(subcommand)]
    pub command: TargetCommands,
}

#[derive(Subcommand, Debug)]
pub enum TargetCommands {
    /// Add an active target to a workspace
    Add {
        workspace: WorkspaceId,

        /// Model configuration name (see `evalite models`)
        #[arg(long, short)]
        model: String,

        /// Display name; defaults to the model configuration name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Include a target in evaluations
    Enable {
        workspace: WorkspaceId,
        target: TargetId,
    },
    /// Exclude a target from evaluations
    Disable {
        workspace: WorkspaceId,
        target: TargetId,
    },
    /// Delete a target
    Remove {
        workspace: WorkspaceId,
        target: TargetId,
    },
}

pub async fn run(args: TargetArgs, service: &EvalService) -> Result<()> {
    match args.command {
        TargetCommands::Add {
            workspace,
            model,
            name,
            max_tokens,
            temperature,
        } => {
            let options = MessageOptions {
                max_tokens,
                temperature,
            };
            let name = name.unwrap_or_else(|| model.clone());
            let target = service
                .create_evaluation_target(workspace, &name, &model, options)
                .await?;
            println!("Added target '{}' ({})", target.name, target.id);
        }
        TargetCommands::Enable { workspace, target } => {
            let target = service
                .set_evaluation_target_active(workspace, target, true)
                .await?;
            println!("Enabled '{}'", target.name);
        }
        TargetCommands::Disable { workspace, target } => {
            let target = service
                .set_evaluation_target_active(workspace, target, false)
                .await?;
            println!("Disabled '{}'", target.name);
        }
        TargetCommands::Remove { workspace, target } => {
            service.delete_evaluation_target(workspace, target).await?;
            println!("Removed target {target}");
        }
    }
    Ok(())
}
