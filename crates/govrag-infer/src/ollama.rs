//! Ollama embedding backend (`POST /api/embed`).
//!
//! Blocking client, bounded timeout. Connection failures and 429s are retried
//! with exponential backoff.

use std::fmt;
use std::time::Duration;

use ndarray::Array1;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedder::{check_dimension, l2_normalize, Embedder};
use govrag_core::{EmbeddingError, RetryPolicy};

const EMBED_ENDPOINT: &str = "/api/embed";

/// Ollama embedding provider using the local HTTP API.
pub struct OllamaEmbedder {
    /// Built on first use so construction never happens inside an async context.
    client: OnceCell<Client>,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Failure of one HTTP attempt, classified for the retry loop.
#[derive(Debug)]
enum CallError {
    Transient(String),
    Permanent(EmbeddingError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => f.write_str(msg),
            Self::Permanent(e) => write!(f, "{}", e),
        }
    }
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: OnceCell::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            timeout,
            retry,
        }
    }

    fn client(&self) -> Result<&Client, EmbeddingError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| EmbeddingError::Provider(format!("HTTP client init failed: {}", e)))
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.client()?;
        let url = format!("{}{}", self.base_url, EMBED_ENDPOINT);
        debug!("Embedding batch of {} texts via {}", texts.len(), url);

        let result = self.retry.run_blocking(
            || self.call(client, &url, texts),
            |e| matches!(e, CallError::Transient(_)),
        );
        let vectors = match result {
            Ok(v) => v,
            Err(CallError::Transient(msg)) => return Err(EmbeddingError::Provider(msg)),
            Err(CallError::Permanent(e)) => return Err(e),
        };

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Provider(format!(
                "Ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        vectors
            .into_iter()
            .map(|v| {
                let v = Array1::from_vec(v);
                check_dimension(self.dimension, &v)?;
                Ok(l2_normalize(v))
            })
            .collect()
    }

    fn call(&self, client: &Client, url: &str, texts: &[&str]) -> Result<Vec<Vec<f32>>, CallError> {
        let response = client
            .post(url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| CallError::Transient(format!("Ollama unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error)
                .unwrap_or(body);
            return Err(classify_status(status, &detail));
        }

        let body: EmbedResponse = response.json().map_err(|e| {
            CallError::Permanent(EmbeddingError::Provider(format!(
                "Failed to parse Ollama response: {}",
                e
            )))
        })?;
        Ok(body.embeddings)
    }
}

/// Only rate limiting is worth retrying; server errors and bad requests are final.
fn classify_status(status: StatusCode, detail: &str) -> CallError {
    let message = format!("Ollama API error ({}): {}", status, detail);
    if status == StatusCode::TOO_MANY_REQUESTS {
        CallError::Transient(message)
    } else {
        CallError::Permanent(EmbeddingError::Provider(message))
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, EmbeddingError> {
        self.embed_batch(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Array1<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Provider("Ollama returned no embedding".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}
