//! Show or change the default small and large model configurations.

use anyhow::Result;
use clap::Args;
use evalite_core::EvalService;

use crate::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct DefaultsArgs {
    /// New default for helper calls (titles, test cases)
    #[arg(long)]
    pub small: Option<String>,

    /// New default for prompt generation
    #[arg(long)]
    pub large: Option<String>,
}

pub async fn run(args: DefaultsArgs, service: &EvalService) -> Result<()> {
    if args.small.is_none() && args.large.is_none() {
        print_current(service).await;
        return Ok(());
    }

    // Validate both before writing either.
    let mut changes = Vec::new();
    if let Some(name) = &args.small {
        let previous = service.set_default_small_model(name).await?;
        changes.push(("small", previous, name.clone()));
    }
    if let Some(name) = &args.large {
        let previous = service.set_default_large_model(name).await?;
        changes.push(("large", previous, name.clone()));
    }

    let path = ConfigLoader::update_user_config(|raw| {
        if let Some(small) = args.small {
            raw.service.default_small_model = Some(small);
        }
        if let Some(large) = args.large {
            raw.service.default_large_model = Some(large);
        }
    })?;

    for (which, previous, current) in changes {
        println!("{which}: {previous} -> {current}");
    }
    println!("Saved to {}", path.display());
    Ok(())
}

async fn print_current(service: &EvalService) {
    for (which, named) in [
        ("small", service.default_small_model().await),
        ("large", service.default_large_model().await),
    ] {
        match named {
            Ok(named) => println!(
                "{which}: {} ({}/{})",
                named.name, named.config.provider_type, named.config.model_name
            ),
            Err(e) => println!("{which}: {e}"),
        }
    }
}
