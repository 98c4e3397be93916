//! Streaming support for AI model responses
//!
//! Turns the backend's Server-Sent Events into typed fragments, folds the
//! fragments into content blocks, and publishes lifecycle events plus a
//! single final message over an [`AssistantMessageEventStream`].

pub mod accumulator;
pub mod block;
pub mod events;
pub mod producer;
pub mod reassembler;
pub mod sse_parser;

pub use accumulator::{ChunkAccumulator, FinishedBlock, Fragment};
pub use block::{BlockAccumulator, BlockType};
pub use events::AssistantMessageEvent;
pub use producer::{spawn_event_stream, AssistantMessageEventStream, StreamOutcome};
pub use reassembler::ToolArgumentReassembler;
pub use sse_parser::{fragment_stream, SseEvent, SseParser};

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Ordered source of fragments pulled by the stream producer
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<OpenAIStreamChunk>> + Send>>;

/// OpenAI stream event (chunk)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAIStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

/// OpenAI choice in stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

/// OpenAI delta content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAIDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Tool call delta for OpenAI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    pub id: Option<String>,
    pub r#type: Option<String>,
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// Argument text carried by this delta, if any
    #[must_use]
    pub fn arguments(&self) -> Option<&str> {
        self.function
            .as_ref()
            .and_then(|function| function.arguments.as_deref())
            .filter(|arguments| !arguments.is_empty())
    }
}

/// Function call delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Error object some backends send in-band instead of a chunk
#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorBody {
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

/// Any JSON payload found in a `data:` line
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StreamPayload {
    Error { error: StreamErrorBody },
    Chunk(OpenAIStreamChunk),
}
