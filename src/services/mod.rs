//! Service layer for LLM providers
//!
//! Defines the [`Provider`] abstraction, the explicit [`ProviderRegistry`]
//! and the OpenAI-compatible chat-completions provider. The streaming
//! engine lives in [`streaming`] and does not depend on any provider.

pub mod openai;
pub mod registry;
pub mod streaming;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ProviderType,
    error::Result,
    messages::{AssistantMessage, Context},
};

pub use openai::OpenAIProvider;
pub use registry::ProviderRegistry;
pub use streaming::AssistantMessageEventStream;

/// Completion options for model requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p for nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Sampling seed
    #[serde(default)]
    pub seed: i64,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            seed: 0,
        }
    }
}

/// A model endpoint that can answer a conversation
///
/// `stream` never fails up front: connection and configuration failures
/// are delivered on the returned stream's error channel like any other
/// backend failure.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider type this model belongs to
    fn provider_type(&self) -> ProviderType;

    /// Model identifier sent to the backend
    fn model(&self) -> &str;

    /// Start a streamed completion
    fn stream(&self, context: &Context, cancel: CancellationToken) -> AssistantMessageEventStream;

    /// Run a single-shot completion
    async fn complete(&self, context: &Context) -> Result<AssistantMessage>;
}
