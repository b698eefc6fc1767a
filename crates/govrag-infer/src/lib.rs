//! GovRAG Infer — embedding backends and the query embedding cache.
//!
//! `create_embedder` picks the backend named by configuration. ONNX needs the
//! `onnx` feature and model files under `data/models/`; when either is missing
//! the deterministic `HashingEmbedder` is used instead.

pub mod cache;
pub mod embedder;
pub mod ollama;
pub mod onnx_embedder;

pub use cache::{CacheStats, QueryCache};
pub use embedder::{check_dimension, Embedder, HashingEmbedder};
pub use ollama::OllamaEmbedder;

#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxEmbedder;

use std::sync::Arc;

use govrag_core::{EmbedderKind, GovRagConfig};

/// Create the embedder selected by `config.embedder.kind`.
pub fn create_embedder(config: &GovRagConfig) -> Arc<dyn Embedder> {
    let dim = config.embedding_dim;
    match config.embedder.kind {
        EmbedderKind::Onnx => onnx_or_fallback(config),
        EmbedderKind::Ollama => {
            tracing::info!(
                "Using Ollama embedder (model={}, url={}, dim={})",
                config.embedder.model,
                config.embedder.ollama_base_url,
                dim
            );
            Arc::new(OllamaEmbedder::new(
                config.embedder.ollama_base_url.clone(),
                config.embedder.model.clone(),
                dim,
                config.request_timeout(),
                config.retry,
            ))
        }
        EmbedderKind::Hashing => {
            tracing::info!("Using hashing embedder (dim={})", dim);
            Arc::new(HashingEmbedder::new(dim))
        }
    }
}

fn onnx_or_fallback(config: &GovRagConfig) -> Arc<dyn Embedder> {
    #[cfg(feature = "onnx")]
    {
        match OnnxEmbedder::load(&config.data_paths.models, config.embedding_dim) {
            Ok(embedder) => {
                tracing::info!("Using ONNX embedder (dim={})", embedder.dimension());
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!("ONNX embedder unavailable: {}. Falling back to hashing.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        tracing::warn!("ONNX feature disabled. Falling back to hashing embedder.");
    }

    Arc::new(HashingEmbedder::new(config.embedding_dim))
}
