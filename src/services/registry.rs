//! Provider registry
//!
//! Maps (provider type, model id) to a ready [`Provider`]. The registry is
//! an ordinary value: build one from [`Config`] and pass it where needed.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    config::{Config, ProviderType},
    error::{PiError, Result},
};

use super::{OpenAIProvider, Provider};

type ModelMap = HashMap<String, Arc<dyn Provider>>;

/// Registry of available models
#[derive(Default)]
pub struct ProviderRegistry {
    models: RwLock<HashMap<ProviderType, ModelMap>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured model of every OpenAI-compatible provider
    ///
    /// Other provider types are skipped with a warning, as are entries that
    /// cannot produce a provider (for example a custom endpoint without a
    /// base URL).
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::new();
        let event_buffer = config.stream.event_capacity();

        for (&provider_type, provider_config) in &config.providers {
            if !provider_type.is_openai_compatible() {
                tracing::warn!(provider = %provider_type, "Skipping provider without chat-completions support");
                continue;
            }

            for model in &provider_config.models {
                match OpenAIProvider::from_config(provider_type, provider_config, model) {
                    Ok(provider) => {
                        registry.register(provider_type, model, Arc::new(provider.with_event_buffer(event_buffer)));
                    }
                    Err(err) => {
                        tracing::warn!(provider = %provider_type, model = %model, error = %err, "Skipping model");
                    }
                }
            }
        }

        registry
    }

    /// Register (or replace) a provider for `model`
    pub fn register(&self, provider_type: ProviderType, model: impl Into<String>, provider: Arc<dyn Provider>) {
        let model = model.into();
        tracing::debug!(provider = %provider_type, model = %model, "Registering model");
        self.models
            .write()
            .entry(provider_type)
            .or_default()
            .insert(model, provider);
    }

    /// Look up the provider serving `model`
    ///
    /// # Errors
    ///
    /// Returns [`PiError::ProviderNotFound`] when nothing is registered for
    /// the provider type and [`PiError::ModelNotFound`] when the model is
    /// unknown to it
    pub fn get(&self, provider_type: ProviderType, model: &str) -> Result<Arc<dyn Provider>> {
        let models = self.models.read();
        let providers = models
            .get(&provider_type)
            .ok_or_else(|| PiError::ProviderNotFound(provider_type.to_string()))?;

        providers
            .get(model)
            .cloned()
            .ok_or_else(|| PiError::ModelNotFound(model.to_string()))
    }

    /// Provider types with at least one registered model, sorted by name
    #[must_use]
    pub fn list_providers(&self) -> Vec<ProviderType> {
        let mut providers: Vec<ProviderType> = self.models.read().keys().copied().collect();
        providers.sort_by_key(ProviderType::as_str);
        providers
    }

    /// Model ids registered for a provider type, sorted
    #[must_use]
    pub fn list_models(&self, provider_type: ProviderType) -> Vec<String> {
        let mut models: Vec<String> = self
            .models
            .read()
            .get(&provider_type)
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default();
        models.sort();
        models
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let models = self.models.read();
        f.debug_map()
            .entries(models.iter().map(|(provider, models)| (provider, models.keys().collect::<Vec<_>>())))
            .finish()
    }
}
