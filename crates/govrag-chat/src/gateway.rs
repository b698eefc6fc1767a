//! Dispatch to the configured provider backends with retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::LlmSettings;
use crate::providers::{AnthropicBackend, GoogleBackend, LlmBackend, OllamaBackend, OpenAiBackend};
use crate::types::{GenerationConfig, ProviderKind};
use govrag_core::{Error, ProviderError, Result, RetryPolicy};

pub struct ProviderGateway {
    backends: HashMap<ProviderKind, Arc<dyn LlmBackend>>,
    retry: RetryPolicy,
}

impl ProviderGateway {
    /// A gateway without backends; add them with [`ProviderGateway::with_backend`].
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            retry,
        }
    }

    /// All four providers over one shared HTTP client.
    pub fn from_settings(settings: &LlmSettings, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))?;

        let gateway = Self::new(retry)
            .with_backend(Arc::new(OpenAiBackend::new(
                client.clone(),
                settings.base_url(ProviderKind::OpenAi),
                settings.openai_api_key.clone(),
            )))
            .with_backend(Arc::new(GoogleBackend::new(
                client.clone(),
                settings.base_url(ProviderKind::Google),
                settings.google_api_key.clone(),
            )))
            .with_backend(Arc::new(AnthropicBackend::new(
                client.clone(),
                settings.base_url(ProviderKind::Anthropic),
                settings.anthropic_api_key.clone(),
            )))
            .with_backend(Arc::new(OllamaBackend::new(
                client,
                settings.base_url(ProviderKind::Ollama),
            )));

        for kind in ProviderKind::ALL {
            if !settings.is_configured(kind) {
                warn!("Provider {} has no API key; requests to it will fail", kind);
            }
        }
        info!("Provider gateway ready (default: {})", settings.default_provider);
        Ok(gateway)
    }

    /// Register a backend, replacing any previous one of the same kind.
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.backends.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Generate a completion, retrying timeouts and rate limits.
    pub async fn generate(&self, prompt: &str, config: &GenerationConfig) -> std::result::Result<String, ProviderError> {
        let backend = self
            .backends
            .get(&config.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(config.provider.to_string()))?;

        info!("Generating with {}/{}", config.provider, config.model);
        self.retry
            .run(move || backend.generate(prompt, config), ProviderError::is_transient)
            .await
    }
}
