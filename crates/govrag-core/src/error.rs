//! Error types for GovRAG.
//!
//! Each pipeline stage has its own taxonomy; [`Error`] wraps them so callers
//! can propagate with `?` and the HTTP layer can map variants to status codes.

use thiserror::Error;

/// Failures while turning a file into text blocks.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt file {path}: {reason}")]
    CorruptFile { path: String, reason: String },

    #[error("No text extracted from {0}")]
    NoText(String),

    #[error("OCR unavailable for {path}: {reason}")]
    OcrUnavailable { path: String, reason: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the vector index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index not initialized: {0}")]
    NotInitialized(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Failures of an embedding backend.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

/// Normalized failures of language-model providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider authentication failed ({provider}): {message}")]
    Auth { provider: String, message: String },

    #[error("Provider rate limit exceeded ({provider}): {message}")]
    RateLimit { provider: String, message: String },

    #[error("Provider request timed out ({provider}): {message}")]
    Timeout { provider: String, message: String },

    #[error("Invalid provider response ({provider}): {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying (timeouts and rate limits only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RateLimit { .. })
    }
}

/// Rejected caller input. Raised before any side effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Query text must not be empty")]
    EmptyQuery,

    #[error("Invalid search configuration: {0}")]
    BadSearchConfig(String),

    #[error("Invalid generation configuration: {0}")]
    BadGenerationConfig(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = ProviderError::Timeout {
            provider: "openai".into(),
            message: "deadline".into(),
        };
        let auth = ProviderError::Auth {
            provider: "openai".into(),
            message: "bad key".into(),
        };
        assert!(timeout.is_transient());
        assert!(!auth.is_transient());
        assert!(!ProviderError::UnknownProvider("x".into()).is_transient());
    }

    #[test]
    fn test_nested_errors_convert() {
        let err: Error = ValidationError::EmptyQuery.into();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyQuery)));
        assert_eq!(err.to_string(), "Query text must not be empty");
    }
}
