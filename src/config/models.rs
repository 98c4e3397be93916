//! Provider types and per-provider configuration

use serde::{Deserialize, Serialize};

/// Model provider identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Nvidia,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Mistral,
    Custom,
}

impl ProviderType {
    /// All known provider types
    pub const ALL: [Self; 5] = [
        Self::Nvidia,
        Self::OpenAI,
        Self::Anthropic,
        Self::Mistral,
        Self::Custom,
    ];

    /// Get the default base URL for this provider
    #[must_use]
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Nvidia => Some("https://integrate.api.nvidia.com/v1"),
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Mistral => Some("https://api.mistral.ai/v1"),
            Self::Custom => None, // Custom requires user-specified endpoint
        }
    }

    /// Models registered when the environment names none
    #[must_use]
    pub const fn default_models(&self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &["openai/gpt-oss-20b"],
            Self::OpenAI => &["gpt-4o-mini"],
            Self::Anthropic | Self::Mistral | Self::Custom => &[],
        }
    }

    /// Whether the provider speaks the OpenAI chat-completions protocol
    #[must_use]
    pub const fn is_openai_compatible(&self) -> bool {
        matches!(self, Self::Nvidia | Self::OpenAI | Self::Custom)
    }

    /// Prefix of the environment variables configuring this provider
    #[must_use]
    pub const fn env_prefix(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA",
            Self::OpenAI => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::Mistral => "MISTRAL",
            Self::Custom => "CUSTOM",
        }
    }

    /// Lowercase identifier, as used in config files and on the CLI
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Mistral => "mistral",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// Connection settings and model list for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API endpoint (falls back to the provider default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key for bearer authentication
    #[serde(default)]
    pub api_key: String,

    /// Model identifiers served by this provider
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Get the effective base URL (custom or default)
    #[must_use]
    pub fn effective_base_url(&self, provider: ProviderType) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| provider.default_base_url().map(String::from))
    }
}
