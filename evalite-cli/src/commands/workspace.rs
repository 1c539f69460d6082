//! Workspace and prompt version commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;
use evalite_core::{EvalService, WorkspaceId};

use super::{ContentArgs, table};
use crate::app;

#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// Create a workspace with its first prompt version
    Create {
        /// Workspace name; generated from the prompt when omitted
        #[arg(long, default_value = "")]
        name: String,

        #[command(flatten)]
        prompt: ContentArgs,
    },
    /// Show prompt versions and targets of a workspace
    Show { workspace: WorkspaceId },
    /// Add a prompt version (it becomes active)
    AddVersion {
        workspace: WorkspaceId,

        #[command(flatten)]
        prompt: ContentArgs,
    },
    /// Add a system prompt version
    AddSystem {
        workspace: WorkspaceId,

        #[command(flatten)]
        prompt: ContentArgs,
    },
    /// Mark a prompt version active
    Activate {
        workspace: WorkspaceId,
        // Distinct id: `version` collides with the propagated `--version` flag.
        #[arg(id = "prompt_version", value_name = "VERSION")]
        version: u32,
    },
    /// Mark a prompt version inactive
    Deactivate {
        workspace: WorkspaceId,
        // Distinct id: `version` collides with the propagated `--version` flag.
        #[arg(id = "prompt_version", value_name = "VERSION")]
        version: u32,
    },
}

pub async fn run(args: WorkspaceArgs, service: &EvalService) -> Result<()> {
    match args.command {
        WorkspaceCommands::Create { name, prompt } => {
            let content = prompt.read()?;
            let (workspace, prompt) = service
                .create_workspace(&name, &content, &app::cancel_on_ctrl_c())
                .await?;
            println!("Created workspace '{}' ({})", workspace.name, workspace.id);
            print_variables(&prompt.variables);
        }
        WorkspaceCommands::Show { workspace } => show(service, workspace).await?,
        WorkspaceCommands::AddVersion { workspace, prompt } => {
            let prompt = service.add_prompt_version(workspace, &prompt.read()?).await?;
            println!("Added prompt version {}", prompt.version_number);
            print_variables(&prompt.variables);
        }
        WorkspaceCommands::AddSystem { workspace, prompt } => {
            let system = service.add_system_prompt(workspace, &prompt.read()?).await?;
            println!("Added system prompt version {}", system.version_number);
        }
        WorkspaceCommands::Activate { workspace, version } => {
            let ws = service.set_version_active(workspace, version, true).await?;
            println!("Active versions: {:?}", ws.active_version_numbers);
        }
        WorkspaceCommands::Deactivate { workspace, version } => {
            let ws = service.set_version_active(workspace, version, false).await?;
            println!("Active versions: {:?}", ws.active_version_numbers);
        }
    }
    Ok(())
}

fn print_variables(variables: &[evalite_core::Variable]) {
    if variables.is_empty() {
        println!("Variables: none");
    } else {
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        println!("Variables: {}", names.join(", "));
    }
}

async fn show(service: &EvalService, id: WorkspaceId) -> Result<()> {
    let details = service.get_workspace(id).await?;
    let workspace = &details.workspace;

    println!("Workspace: {}", workspace.name);
    println!("ID: {}", workspace.id);
    println!("Test cases: {}", details.test_case_count);
    println!();

    let mut versions = table(&["Version", "Active", "Variables", "Prompt"]);
    for prompt in &details.prompts {
        let active = workspace
            .active_version_numbers
            .contains(&prompt.version_number);
        let variables: Vec<_> = prompt.variables.iter().map(|v| v.name.as_str()).collect();
        versions.add_row(vec![
            Cell::new(prompt.version_number),
            Cell::new(if active { "yes" } else { "no" }),
            Cell::new(variables.join(", ")),
            Cell::new(&prompt.content),
        ]);
    }
    println!("{versions}");

    if details.targets.is_empty() {
        println!("No evaluation targets.");
        return Ok(());
    }

    let mut targets = table(&["Target", "ID", "Model", "Max tokens", "Temperature", "Active"]);
    for target in &details.targets {
        let options = target.message_options;
        targets.add_row(vec![
            Cell::new(&target.name),
            Cell::new(target.id),
            Cell::new(&target.model_config_name),
            Cell::new(options.max_tokens.map(|t| t.to_string()).unwrap_or_default()),
            Cell::new(options.temperature.map(|t| t.to_string()).unwrap_or_default()),
            Cell::new(if target.active { "yes" } else { "no" }),
        ]);
    }
    println!("{targets}");
    Ok(())
}
