//! GovRAG Core — configuration, error taxonomy, retry policy.

pub mod config;
pub mod error;
pub mod retry;

pub use config::{DataPaths, EmbedderKind, EmbedderSettings, GovRagConfig};
pub use error::{
    EmbeddingError, Error, IndexError, LoaderError, ProviderError, Result, ValidationError,
};
pub use retry::RetryPolicy;
