//! Provider identifiers and validated generation parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use govrag_core::{ProviderError, Result, ValidationError};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_OLLAMA_MODEL: &str = "deepseek-r1:8b";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Language-model provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Google,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::OpenAi, Self::Google, Self::Anthropic, Self::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
            Self::Google => DEFAULT_GOOGLE_MODEL,
            Self::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }

    /// Local providers run without credentials.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ProviderError::UnknownProvider(s.to_string()))
    }
}

/// Per-request overrides; anything left out comes from [`LlmSettings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Fully resolved, validated generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationConfig {
    /// Merge overrides with settings. An unknown provider name fails here,
    /// before anything touches the network.
    pub fn resolve(overrides: &GenerationOverrides, settings: &LlmSettings) -> Result<Self> {
        let provider = match overrides.provider.as_deref() {
            Some(name) if !name.trim().is_empty() => name.parse()?,
            _ => settings.default_provider,
        };
        let model = match overrides.model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => settings.model_for(provider),
        };
        let config = Self {
            provider,
            model,
            temperature: overrides.temperature.unwrap_or(settings.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(settings.max_tokens),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::BadGenerationConfig(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::BadGenerationConfig(
                "max_tokens must be at least 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::BadGenerationConfig(
                "model must not be empty".into(),
            ));
        }
        Ok(())
    }
}
