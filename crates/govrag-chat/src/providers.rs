//! Language-model provider backends.
//!
//! Every backend sends one non-streaming completion request and normalizes
//! failures into [`ProviderError`]: 401/403 → `Auth`, 429 → `RateLimit`,
//! timeouts and unreachable hosts → `Timeout`, anything else → `InvalidResponse`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::types::{GenerationConfig, ProviderKind};
use govrag_core::ProviderError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One language-model provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Complete `prompt` and return the generated text.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ProviderError>;
}

/// OpenAI chat completions API.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ProviderError> {
        let provider = self.kind();
        let key = require_key(provider, self.api_key.as_deref())?;
        let body = json!({
            "model": config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&body);

        let response = send_json(provider, request).await?;
        non_empty(
            provider,
            response["choices"][0]["message"]["content"].as_str().map(str::to_string),
        )
    }
}

/// Google Gemini `generateContent` API.
pub struct GoogleBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBackend {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmBackend for GoogleBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ProviderError> {
        let provider = self.kind();
        let key = require_key(provider, self.api_key.as_deref())?;
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": config.temperature,
                "maxOutputTokens": config.max_tokens,
            },
        });
        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, config.model))
            .header("x-goog-api-key", key)
            .json(&body);

        let response = send_json(provider, request).await?;
        let text = response["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<String>()
            });
        non_empty(provider, text)
    }
}

/// Anthropic Messages API.
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicBackend {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ProviderError> {
        let provider = self.kind();
        let key = require_key(provider, self.api_key.as_deref())?;
        let body = json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response = send_json(provider, request).await?;
        let text = response["content"].as_array().map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<String>()
        });
        non_empty(provider, text)
    }
}

/// Local Ollama `/api/generate`.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ProviderError> {
        let provider = self.kind();
        let body = json!({
            "model": config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": config.temperature,
                "num_predict": config.max_tokens,
            },
        });
        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body);

        let response = send_json(provider, request).await?;
        let text = response["response"].as_str().map(strip_reasoning);
        non_empty(provider, text)
    }
}

/// Reasoning models (deepseek-r1) prefix the answer with a `<think>` block.
fn strip_reasoning(text: &str) -> String {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<think>") {
        if let Some(end) = trimmed.find("</think>") {
            return trimmed[end + "</think>".len()..].trim().to_string();
        }
    }
    text.trim().to_string()
}

fn require_key(provider: ProviderKind, key: Option<&str>) -> Result<&str, ProviderError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::Auth {
            provider: provider.to_string(),
            message: "API key not configured".into(),
        })
}

async fn send_json(provider: ProviderKind, request: RequestBuilder) -> Result<Value, ProviderError> {
    debug!("Sending completion request to {}", provider);
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }
    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            classify_transport(provider, &e)
        } else {
            ProviderError::InvalidResponse {
                provider: provider.to_string(),
                message: format!("undecodable body: {}", e),
            }
        }
    })
}

pub(crate) fn classify_transport(provider: ProviderKind, e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    } else {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

pub(crate) fn classify_status(provider: ProviderKind, status: StatusCode, body: &str) -> ProviderError {
    let provider = provider.to_string();
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { provider, message },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit { provider, message },
        _ => ProviderError::InvalidResponse { provider, message },
    }
}

fn non_empty(provider: ProviderKind, text: Option<String>) -> Result<String, ProviderError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: "response contained no answer text".into(),
        }),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}
