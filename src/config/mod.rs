//! Configuration management for pi-ai
//!
//! Provider settings are layered:
//! 1. Settings file (`<config_dir>/pi-ai/config.json`)
//! 2. `.env` file in the working directory
//! 3. Environment variables (highest priority)

pub mod models;
pub mod settings;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub use self::{
    models::{ProviderConfig, ProviderType},
    settings::{SettingsFile, StreamSettings},
};
use crate::error::{PiError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configurations keyed by provider type
    #[serde(default)]
    pub providers: HashMap<ProviderType, ProviderConfig>,

    /// Streaming engine settings
    #[serde(default)]
    pub stream: StreamSettings,
}

impl Config {
    /// Load configuration from the settings file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be parsed or no
    /// provider ends up configured
    pub fn load() -> Result<Self> {
        if dotenv::dotenv().is_err() {
            tracing::debug!("No .env file found, using environment variables");
        }

        let file = SettingsFile::load_from_path(&Self::global_config_path())?;
        let mut config = Self {
            providers: file.providers,
            stream: file.stream,
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build configuration purely from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_err() {
            tracing::debug!("No .env file found, using environment variables");
        }

        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay provider settings found through `lookup`
    ///
    /// For each provider `<P>`: `<P>_API_KEY` enables it, `<P>_API_URL` or
    /// `<P>_BASE_URL` overrides the endpoint, and `<P>_MODELS` (comma
    /// separated) overrides the model list.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: String| lookup(&key).filter(|value| !value.trim().is_empty());

        for provider in ProviderType::ALL {
            let prefix = provider.env_prefix();
            let Some(api_key) = non_empty(format!("{prefix}_API_KEY")) else {
                continue;
            };

            let entry = self.providers.entry(provider).or_default();
            entry.api_key = api_key;

            if let Some(url) = non_empty(format!("{prefix}_API_URL"))
                .or_else(|| non_empty(format!("{prefix}_BASE_URL")))
            {
                entry.base_url = Some(url);
            }
            if entry.base_url.is_none() {
                entry.base_url = provider.default_base_url().map(String::from);
            }

            if let Some(models) = non_empty(format!("{prefix}_MODELS")) {
                entry.models = models
                    .split(',')
                    .map(str::trim)
                    .filter(|model| !model.is_empty())
                    .map(String::from)
                    .collect();
            }
            if entry.models.is_empty() {
                entry.models = provider
                    .default_models()
                    .iter()
                    .map(|model| (*model).to_string())
                    .collect();
            }
        }
    }

    /// Check that at least one provider is configured
    ///
    /// # Errors
    ///
    /// Returns [`PiError::InvalidConfig`] when the provider map is empty
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(PiError::InvalidConfig(
                "no provider configurations found".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pi-ai")
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get a provider configuration
    ///
    /// # Errors
    ///
    /// Returns [`PiError::ProviderNotFound`] if the provider is not configured
    pub fn get_provider(&self, provider: ProviderType) -> Result<&ProviderConfig> {
        self.providers
            .get(&provider)
            .ok_or_else(|| PiError::ProviderNotFound(provider.to_string()))
    }

    /// Insert or replace a provider configuration
    pub fn set_provider(&mut self, provider: ProviderType, config: ProviderConfig) {
        self.providers.insert(provider, config);
    }

    /// Write this configuration as a settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        SettingsFile {
            providers: self.providers.clone(),
            stream: self.stream,
        }
        .save_to_path(path)
    }
}
