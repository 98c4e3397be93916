//! On-disk settings file

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, ProviderType};
use crate::error::{PiError, Result};

/// Streaming engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Capacity of the event channel between producer and consumer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    1
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamSettings {
    /// Event channel capacity, never zero
    #[must_use]
    pub fn event_capacity(&self) -> usize {
        self.event_buffer.max(1)
    }
}

/// Settings file (`<config_dir>/pi-ai/config.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    /// Provider configurations
    #[serde(default)]
    pub providers: HashMap<ProviderType, ProviderConfig>,

    /// Streaming engine settings
    #[serde(default)]
    pub stream: StreamSettings,
}

impl SettingsFile {
    /// Load settings from a specific path
    ///
    /// A missing file yields empty settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| PiError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| PiError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save settings to a specific path, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
