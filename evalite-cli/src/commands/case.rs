//! Test case commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;
use evalite_core::{EvalService, TestCaseId, WorkspaceId};

use super::{VariableArgs, format_values, print_results, table};

#[derive(Args, Debug)]
pub struct CaseArgs {
    #[command(subcommand)]
    pub command: CaseCommands,
}

#[derive(Subcommand, Debug)]
pub enum CaseCommands {
    /// List test cases of a workspace, one page at a time
    List {
        workspace: WorkspaceId,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = 20)]
        page_size: u64,
    },
    /// Add a test case
    Add {
        workspace: WorkspaceId,

        #[command(flatten)]
        variables: VariableArgs,
    },
    /// Delete a test case and its results
    Delete {
        workspace: WorkspaceId,
        case: TestCaseId,
    },
    /// Show stored results of a test case
    Results { case: TestCaseId },
}

pub async fn run(args: CaseArgs, service: &EvalService) -> Result<()> {
    match args.command {
        CaseCommands::List {
            workspace,
            page,
            page_size,
        } => {
            let listing = service.list_test_cases(workspace, page, page_size).await?;
            if listing.items.is_empty() {
                println!("No test cases on page {page} ({} total).", listing.total_count);
                return Ok(());
            }

            let mut table = table(&["ID", "Variables", "Evaluated"]);
            for case in &listing.items {
                table.add_row(vec![
                    Cell::new(case.id),
                    Cell::new(format_values(&case.variable_values)),
                    Cell::new(if case.has_been_evaluated { "yes" } else { "no" }),
                ]);
            }
            println!("{table}");
            println!(
                "Page {page}: {} of {} test cases",
                listing.items.len(),
                listing.total_count
            );
        }
        CaseCommands::Add {
            workspace,
            variables,
        } => {
            let case = service
                .create_test_case(workspace, variables.into_values()?)
                .await?;
            println!("Added test case {}", case.id);
        }
        CaseCommands::Delete { workspace, case } => {
            service.delete_test_case(workspace, case).await?;
            println!("Deleted test case {case}");
        }
        CaseCommands::Results { case } => {
            print_results(&service.test_results(case).await?);
        }
    }
    Ok(())
}
