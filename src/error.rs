//! Error types for pi-ai

use std::path::PathBuf;

use thiserror::Error;

use crate::messages::StopReason;

/// Result type alias using [`PiError`]
pub type Result<T> = std::result::Result<T, PiError>;

/// Main error type for pi-ai
#[derive(Debug, Error)]
pub enum PiError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// API error reported by a provider (non-success status, in-band error)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Malformed or interrupted fragment stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No models registered for the provider
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Model not registered under the provider
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Provider type has no protocol implementation
    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

impl PiError {
    /// Stop reason reported for a stream that ended with this error
    #[must_use]
    pub const fn stop_reason(&self) -> StopReason {
        match self {
            Self::Cancelled => StopReason::Aborted,
            _ => StopReason::Error,
        }
    }

    /// Whether this error came from caller-initiated cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
