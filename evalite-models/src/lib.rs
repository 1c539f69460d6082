//! Model access for evalite.
//!
//! This crate provides:
//! - The model-configuration catalog (name -> provider, model, base URL)
//! - Credential lookup for provider API keys
//! - The [`Responder`](providers::Responder) trait every provider client implements
//! - A registry mapping provider identifiers to responders
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────────────┐
//! │   ModelConfigStore   │      │        ResponderRegistry          │
//! │  "gpt-4o" -> openai  │      │  ┌─────────┐ ┌────────┐ ┌──────┐  │
//! │  "llama3" -> ollama  │      │  │ OpenAI  │ │  Groq  │ │Ollama│  │
//! └──────────────────────┘      │  └─────────┘ └────────┘ └──────┘  │
//!                               └──────────────────────────────────┘
//!                                              │
//!                                              ▼
//!                               ┌──────────────────────────────────┐
//!                               │          CredentialStore          │
//!                               │   (env vars + explicit overrides) │
//!                               └──────────────────────────────────┘
//! ```

mod error;
mod types;

pub mod auth;
pub mod providers;
pub mod registry;

pub use error::{Error, Result};
pub use registry::{ModelConfigStore, ResponderRegistry};
pub use types::{ModelConfig, ModelType, ProviderType};
