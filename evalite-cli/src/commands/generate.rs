//! Model-assisted drafting of prompts and test cases.

use anyhow::Result;
use clap::{Args, Subcommand};
use evalite_core::{EvalService, WorkspaceId};

use super::format_values;
use crate::app;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(subcommand)]
    pub command: GenerateCommands,
}

#[derive(Subcommand, Debug)]
pub enum GenerateCommands {
    /// Draft a prompt template from a task description
    Prompt {
        /// What the prompt should get the model to do
        task: String,

        /// Model configuration; the large default when omitted
        #[arg(long, short)]
        model: Option<String>,
    },
    /// Invent and store a test case for a prompt version
    Case {
        workspace: WorkspaceId,

        /// Prompt version to write a case for
        #[arg(long, short = 'p')]
        prompt_version: u32,
    },
}

pub async fn run(args: GenerateArgs, service: &EvalService) -> Result<()> {
    let cancel = app::cancel_on_ctrl_c();
    match args.command {
        GenerateCommands::Prompt { task, model } => {
            let prompt = service
                .generate_prompt(model.as_deref(), &task, &cancel)
                .await?;
            println!("{prompt}");
        }
        GenerateCommands::Case {
            workspace,
            prompt_version,
        } => {
            let case = service
                .generate_test_case(workspace, prompt_version, &cancel)
                .await?;
            println!("Added test case {}", case.id);
            println!("{}", format_values(&case.variable_values));
        }
    }
    Ok(())
}
