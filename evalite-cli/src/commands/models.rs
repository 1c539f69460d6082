//! Model configuration listing.

use anyhow::{Result, anyhow};
use clap::Args;
use comfy_table::Cell;
use evalite_core::EvalService;
use evalite_models::ProviderType;

use super::table;

/// Models arguments.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Filter by provider name
    #[arg(long)]
    pub provider: Option<String>,
}

/// List model configurations a target can use.
pub async fn run(args: ModelsArgs, service: &EvalService) -> Result<()> {
    let small = service.default_small_model().await.ok().map(|m| m.name);
    let large = service.default_large_model().await.ok().map(|m| m.name);

    let provider = args
        .provider
        .as_deref()
        .map(|p| ProviderType::parse(p).ok_or_else(|| anyhow!("unknown provider '{p}'")))
        .transpose()?;

    let mut configs = service.list_model_configs();
    if let Some(provider) = provider {
        configs.retain(|c| c.config.provider_type == provider);
    }

    if configs.is_empty() {
        if provider.is_some() {
            println!("No models match the specified provider.");
        } else {
            println!("No models available.");
            println!();
            println!("Set a provider API key (e.g. OPENAI_API_KEY) or enable Ollama.");
        }
        return Ok(());
    }

    let mut table = table(&["Name", "Provider", "Model", "Default"]);
    for named in configs {
        let default = match (small.as_deref(), large.as_deref()) {
            (Some(s), _) if s == named.name => "small",
            (_, Some(l)) if l == named.name => "large",
            _ => "",
        };
        table.add_row(vec![
            Cell::new(&named.name),
            Cell::new(named.config.provider_type),
            Cell::new(&named.config.model_name),
            Cell::new(default),
        ]);
    }

    println!("{table}");
    Ok(())
}
