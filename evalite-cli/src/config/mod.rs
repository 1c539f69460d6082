mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{EvaliteConfig, StorageConfig};
// OllamaConfig is used by tests in app.rs
#[allow(unused_imports)]
pub use types::OllamaConfig;
