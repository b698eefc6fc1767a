//! GovRAG Chat — prompt building and the language-model provider gateway.
//!
//! Providers are capability objects behind [`LlmBackend`]; the
//! [`ProviderGateway`] picks one per request and applies the retry policy.

pub mod config;
pub mod gateway;
pub mod prompt;
pub mod providers;
pub mod types;

pub use config::LlmSettings;
pub use gateway::ProviderGateway;
pub use prompt::{build_prompt, display_source, NO_CONTEXT_MARKER};
pub use providers::LlmBackend;
pub use types::*;
