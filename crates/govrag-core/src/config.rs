//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Paths to all GovRAG data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Vector index directory (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// Staging area for uploaded files awaiting ingestion (`data/uploads/`).
    pub uploads: PathBuf,
    /// Source documents ingested at bootstrap (`data/documents/` unless overridden).
    pub documents: PathBuf,
    /// ONNX model assets (`data/models/`).
    pub models: PathBuf,
    /// LLM provider configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>, documents: Option<PathBuf>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            uploads: root.join("uploads"),
            documents: documents.unwrap_or_else(|| root.join("documents")),
            models: root.join("models"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.vectordb)?;
        std::fs::create_dir_all(&self.uploads)?;
        std::fs::create_dir_all(&self.documents)?;
        Ok(())
    }
}

/// Which embedding backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Onnx,
    Ollama,
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            other => Err(Error::Config(format!("Unknown embedder backend: {}", other))),
        }
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    /// Model name for HTTP backends (ignored by ONNX, which reads `models/`).
    pub model: String,
    pub ollama_base_url: String,
    /// Texts per embedding call during ingestion.
    pub batch_size: usize,
}

/// Top-level GovRAG configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovRagConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Embedding dimension (768 for multilingual-e5-base).
    pub embedding_dim: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Upper bound for `k`; larger requests are capped.
    pub max_search_k: usize,
    /// Default MMR trade-off between relevance (1.0) and diversity (0.0).
    pub mmr_lambda: f32,
    /// MMR candidate pool size as a multiple of `k`.
    pub mmr_fetch_multiplier: usize,
    /// Default cutoff for `similarity_score_threshold` searches.
    pub default_score_threshold: f32,
    /// PDF pages with fewer non-whitespace characters than this are OCRed.
    pub ocr_min_chars: usize,
    /// Tesseract language list, e.g. `por+eng`.
    pub ocr_language: String,
    /// Ingest the documents directory at startup when the index is empty.
    pub bootstrap_ingest: bool,
    pub embedder: EmbedderSettings,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl GovRagConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let documents = std::env::var("GOVRAG_DOCS_DIR").ok().map(PathBuf::from);
        let data_paths = DataPaths::new(data_dir, documents)?;

        let embedder_kind = match std::env::var("GOVRAG_EMBEDDER") {
            Ok(v) => v.parse()?,
            Err(_) => EmbedderKind::Onnx,
        };

        let config = Self {
            port: env_or("PORT", 8000),
            data_paths,
            embedding_dim: env_or("GOVRAG_EMBEDDING_DIM", 768),
            chunk_size: env_or("GOVRAG_CHUNK_SIZE", 2000),
            chunk_overlap: env_or("GOVRAG_CHUNK_OVERLAP", 200),
            max_search_k: env_or("GOVRAG_MAX_SEARCH_K", 20),
            mmr_lambda: env_or("GOVRAG_MMR_LAMBDA", 0.5),
            mmr_fetch_multiplier: env_or("GOVRAG_MMR_FETCH_MULTIPLIER", 4),
            default_score_threshold: env_or("GOVRAG_SCORE_THRESHOLD", 0.5),
            ocr_min_chars: env_or("GOVRAG_OCR_MIN_CHARS", 50),
            ocr_language: std::env::var("GOVRAG_OCR_LANG").unwrap_or_else(|_| "por+eng".into()),
            bootstrap_ingest: env_or("GOVRAG_BOOTSTRAP_INGEST", true),
            embedder: EmbedderSettings {
                kind: embedder_kind,
                model: std::env::var("GOVRAG_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-embed-text".into()),
                ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".into()),
                batch_size: env_or("GOVRAG_EMBED_BATCH", 32),
            },
            request_timeout_secs: env_or("GOVRAG_REQUEST_TIMEOUT_SECS", 60),
            retry: RetryPolicy::new(
                env_or("GOVRAG_MAX_ATTEMPTS", 3),
                Duration::from_millis(env_or("GOVRAG_INITIAL_BACKOFF_MS", 500)),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_dim == 0 {
            return Err(Error::Config("embedding dimension must be positive".into()));
        }
        if self.max_search_k == 0 {
            return Err(Error::Config("max search k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(Error::Config(format!(
                "MMR lambda must be within [0, 1], got {}",
                self.mmr_lambda
            )));
        }
        if !(0.0..=1.0).contains(&self.default_score_threshold) {
            return Err(Error::Config(format!(
                "score threshold must be within [0, 1], got {}",
                self.default_score_threshold
            )));
        }
        if self.mmr_fetch_multiplier == 0 || self.embedder.batch_size == 0 {
            return Err(Error::Config(
                "MMR fetch multiplier and embedding batch size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
