use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "evalite", about = "Run prompt templates against model targets")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available model configurations
    Models(commands::models::ModelsArgs),
    /// Manage workspaces and prompt versions
    Workspace(commands::workspace::WorkspaceArgs),
    /// Manage evaluation targets
    Target(commands::target::TargetArgs),
    /// Manage test cases
    Case(commands::case::CaseArgs),
    /// Evaluate a test case against every active target
    Eval(commands::eval::EvalArgs),
    /// Run all test cases against the first active target
    Synth(commands::synth::SynthArgs),
    /// Draft prompts and test cases with a model
    Generate(commands::generate::GenerateArgs),
    /// Send one message to a model configuration
    Infer(commands::infer::InferArgs),
    /// Show or change default model configurations
    Defaults(commands::defaults::DefaultsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let service = app::service().await?;

    match cli.command {
        Commands::Models(args) => commands::models::run(args, &service).await,
        Commands::Workspace(args) => commands::workspace::run(args, &service).await,
        Commands::Target(args) => commands::target::run(args, &service).await,
        Commands::Case(args) => commands::case::run(args, &service).await,
        Commands::Eval(args) => commands::eval::run(args, &service).await,
        Commands::Synth(args) => commands::synth::run(args, &service).await,
        Commands::Generate(args) => commands::generate::run(args, &service).await,
        Commands::Infer(args) => commands::infer::run(args, &service).await,
        Commands::Defaults(args) => commands::defaults::run(args, &service).await,
    }
}
