//! Ad-hoc inference against one model configuration.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use evalite_core::EvalService;
use evalite_models::providers::{InferMessage, InferRequest};
use tokio_stream::StreamExt;

use crate::app;

#[derive(Args, Debug)]
pub struct InferArgs {
    /// User message
    pub prompt: String,

    /// Model configuration name
    #[arg(long, short)]
    pub model: String,

    /// System message sent first
    #[arg(long)]
    pub system: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Print the reply once complete instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

impl InferArgs {
    fn request(&self, service: &EvalService) -> Result<InferRequest> {
        let config = service
            .list_model_configs()
            .into_iter()
            .find(|named| named.name == self.model)
            .with_context(|| format!("model '{}' is not available", self.model))?
            .config;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(InferMessage::system(system));
        }
        messages.push(InferMessage::user(&self.prompt));

        let mut request = InferRequest::new(config, messages);
        if let Some(max_tokens) = self.max_tokens {
            request = request.max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        Ok(request)
    }
}

pub async fn run(args: InferArgs, service: &EvalService) -> Result<()> {
    let request = args.request(service)?;

    if args.no_stream {
        println!("{}", service.infer(request).await?);
        return Ok(());
    }

    let cancel = app::cancel_on_ctrl_c();
    let mut stream = service.infer_stream(request).await?;
    let mut stdout = std::io::stdout();
    loop {
        let delta = tokio::select! {
            _ = cancel.cancelled() => break,
            delta = stream.next() => delta,
        };
        let Some(delta) = delta else { break };
        let delta = delta?;
        if let Some(text) = delta.text {
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
        if delta.done {
            break;
        }
    }
    println!();
    Ok(())
}
