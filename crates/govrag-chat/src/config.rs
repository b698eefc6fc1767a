//! LLM provider settings, loaded from `llm-config.json` with env-var fallback.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{ProviderKind, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Credentials, endpoints and generation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub default_provider: ProviderKind,
    /// Model for `default_provider`; other providers use their built-in default.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub google_base_url: Option<String>,
    #[serde(default)]
    pub anthropic_base_url: Option<String>,
    #[serde(default)]
    pub ollama_base_url: Option<String>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::OpenAi,
            default_model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            openai_api_key: None,
            google_api_key: None,
            anthropic_api_key: None,
            openai_base_url: None,
            google_base_url: None,
            anthropic_base_url: None,
            ollama_base_url: None,
        }
    }
}

impl LlmSettings {
    /// Load settings from file, falling back to env vars and defaults.
    ///
    /// A missing file is normal; a malformed one is logged and ignored.
    pub fn load(config_path: &Path) -> Self {
        let mut settings = match std::fs::read_to_string(config_path) {
            Ok(raw) => match serde_json::from_str::<LlmSettings>(&raw) {
                Ok(settings) => {
                    info!("Loaded LLM settings from {}", config_path.display());
                    settings
                }
                Err(e) => {
                    warn!("Ignoring malformed {}: {}", config_path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Fill unset keys and endpoints from the environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.is_none() {
                *slot = lookup(key).filter(|v| !v.trim().is_empty());
            }
        };
        fill(&mut self.openai_api_key, "OPENAI_API_KEY");
        fill(&mut self.google_api_key, "GOOGLE_API_KEY");
        fill(&mut self.anthropic_api_key, "ANTHROPIC_API_KEY");
        fill(&mut self.ollama_base_url, "OLLAMA_BASE_URL");
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Google => self.google_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderKind::Ollama => None,
        }
    }

    pub fn base_url(&self, provider: ProviderKind) -> &str {
        let (configured, default) = match provider {
            ProviderKind::OpenAi => (&self.openai_base_url, DEFAULT_OPENAI_BASE_URL),
            ProviderKind::Google => (&self.google_base_url, DEFAULT_GOOGLE_BASE_URL),
            ProviderKind::Anthropic => (&self.anthropic_base_url, DEFAULT_ANTHROPIC_BASE_URL),
            ProviderKind::Ollama => (&self.ollama_base_url, DEFAULT_OLLAMA_BASE_URL),
        };
        configured.as_deref().unwrap_or(default).trim_end_matches('/')
    }

    pub fn model_for(&self, provider: ProviderKind) -> String {
        match &self.default_model {
            Some(model) if provider == self.default_provider => model.clone(),
            _ => provider.default_model().to_string(),
        }
    }

    /// Whether a provider can be called at all with the current settings.
    pub fn is_configured(&self, provider: ProviderKind) -> bool {
        !provider.requires_api_key() || self.api_key(provider).is_some()
    }
}
