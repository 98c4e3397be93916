//! Message types for LLM conversations
//!
//! This module defines the conversation context sent to a provider and the
//! assistant message produced by it, both for one-shot completions and for
//! the streaming accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ProviderType;

/// Parsed tool-call arguments (argument name -> JSON value)
pub type Arguments = Map<String, Value>;

/// A function/tool invocation requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

/// Content item in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        /// Base64 data URL or remote URL
        data: String,
        mime_type: String,
    },
    ToolCall(ToolCall),
}

impl Content {
    /// Create a text content item
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Borrow the text if this is a text item
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } | Self::ToolCall(_) => None,
        }
    }

    /// Borrow the tool call if this is a tool-call item
    #[must_use]
    pub const fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            Self::Text { .. } | Self::Image { .. } => None,
        }
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the response
    Stop,
    /// Truncated by the output token limit
    Length,
    /// Ended so the caller can run tools
    ToolUse,
    /// Cancelled by the caller
    Aborted,
    /// Ended by a backend-side failure or filter
    Error,
    #[default]
    Unknown,
}

impl StopReason {
    /// Map an OpenAI-style `finish_reason` to a stop reason
    #[must_use]
    pub fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolUse,
            "content_filter" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolUse => "tool_use",
            Self::Aborted => "aborted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Assistant message, either complete or under construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub contents: Vec<Content>,
    pub stop_reason: StopReason,
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderType,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AssistantMessage {
    /// Create an empty message stamped with the current time
    #[must_use]
    pub fn new(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            contents: Vec::new(),
            stop_reason: StopReason::Unknown,
            timestamp: Utc::now(),
            provider,
            model: model.into(),
            error_message: None,
        }
    }

    /// Concatenated text of all text items
    #[must_use]
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All tool calls in content order
    #[must_use]
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.contents.iter().filter_map(Content::as_tool_call).collect()
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        contents: Vec<Content>,
        timestamp: DateTime<Utc>,
    },
    Assistant(AssistantMessage),
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        contents: Vec<Content>,
        #[serde(default)]
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    /// Create a user message with a single text item
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            contents: vec![Content::text(text)],
            timestamp: Utc::now(),
        }
    }

    /// Create a tool-result message answering `call`
    #[must_use]
    pub fn tool_result(call: &ToolCall, text: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            contents: vec![Content::text(text)],
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Role name of the message
    #[must_use]
    pub const fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }

    /// Content items of the message
    #[must_use]
    pub fn contents(&self) -> &[Content] {
        match self {
            Self::User { contents, .. } | Self::ToolResult { contents, .. } => contents,
            Self::Assistant(message) => &message.contents,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Self::Assistant(message)
    }
}

/// A function/tool the assistant may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
    #[serde(default)]
    pub strict: bool,
}

/// Full conversation context for a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl Context {
    /// Create a context with a system prompt
    #[must_use]
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Append a message
    pub fn push(&mut self, message: impl Into<Message>) {
        self.messages.push(message.into());
    }
}
