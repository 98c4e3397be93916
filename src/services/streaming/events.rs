//! Lifecycle events published while a response streams in

use std::sync::Arc;

use crate::messages::{AssistantMessage, StopReason, ToolCall};

/// Event describing how the assistant message is being built
///
/// Block events carry a read-only snapshot of the message as it stood when
/// the event was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantMessageEvent {
    Start,
    TextStart {
        content_index: usize,
        partial: Arc<AssistantMessage>,
    },
    TextDelta {
        content_index: usize,
        delta: String,
        partial: Arc<AssistantMessage>,
    },
    TextEnd {
        content_index: usize,
        content: String,
        partial: Arc<AssistantMessage>,
    },
    ToolcallStart {
        content_index: usize,
        partial: Arc<AssistantMessage>,
    },
    ToolcallDelta {
        content_index: usize,
        delta: String,
        partial: Arc<AssistantMessage>,
    },
    ToolcallEnd {
        content_index: usize,
        tool_call: ToolCall,
        partial: Arc<AssistantMessage>,
    },
    Done {
        reason: StopReason,
        message: AssistantMessage,
    },
    Error {
        reason: StopReason,
        partial: AssistantMessage,
    },
}

impl AssistantMessageEvent {
    /// Content index of block events
    #[must_use]
    pub const fn content_index(&self) -> Option<usize> {
        match self {
            Self::TextStart { content_index, .. }
            | Self::TextDelta { content_index, .. }
            | Self::TextEnd { content_index, .. }
            | Self::ToolcallStart { content_index, .. }
            | Self::ToolcallDelta { content_index, .. }
            | Self::ToolcallEnd { content_index, .. } => Some(*content_index),
            Self::Start | Self::Done { .. } | Self::Error { .. } => None,
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Short name of the event kind, for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TextStart { .. } => "text_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextEnd { .. } => "text_end",
            Self::ToolcallStart { .. } => "toolcall_start",
            Self::ToolcallDelta { .. } => "toolcall_delta",
            Self::ToolcallEnd { .. } => "toolcall_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
