//! Responder trait and provider clients.
//!
//! The [`Responder`] trait is the single capability the evaluation core
//! needs from a model vendor: send an [`InferRequest`], get text back,
//! either all at once or as a stream of deltas.
//!
//! # Example
//!
//! ```ignore
//! use evalite_models::providers::{InferMessage, InferRequest, Responder};
//!
//! async fn ask(responder: &dyn Responder, config: ModelConfig) -> Result<String> {
//!     let request = InferRequest::new(config, vec![InferMessage::user("Hello!")]);
//!     responder.generate(request).await
//! }
//! ```

mod ollama;
mod openai;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

pub use ollama::OllamaResponder;
pub use openai::OpenAiResponder;
pub use types::*;

use crate::Result;

/// A stream of response deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// A model inference capability, keyed by provider in the registry.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Returns the provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Perform one inference call and return the full response text.
    async fn generate(&self, request: InferRequest) -> Result<String>;

    /// Perform one inference call, streaming the response.
    async fn generate_stream(&self, request: InferRequest) -> Result<DeltaStream>;
}
