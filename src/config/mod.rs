//! Configuration types and loading for llm-roundtrip

mod build;
mod context;
mod loader;
mod response;

pub use build::{BuildConfig, BuildLayer};
pub use context::{ContextConfig, ContextLayer};
pub use loader::RoundtripConfig;
pub use response::{ResponseConfig, ResponseLayer};
