//! Content-block state machine
//!
//! Folds fragments into the assistant message and decides which lifecycle
//! events each fragment produces. Per fragment the order is fixed:
//! record the finish reason, close a block the backend reported finished,
//! then open/extend a text block, then open/extend a tool-call block.
//! Blocks open on type transitions only; the content index grows by one
//! per opened block and is never reused.

use std::sync::Arc;

use crate::messages::{AssistantMessage, Content, StopReason};

use super::{
    AssistantMessageEvent, ChunkAccumulator, FinishedBlock, Fragment, OpenAIStreamChunk,
};

/// Kind of the currently open content block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    None,
    Text,
    ToolCall,
}

/// Block accumulator and event emitter for one streamed response
#[derive(Debug)]
pub struct BlockAccumulator {
    current_index: Option<usize>,
    current_block: BlockType,
    output: Arc<AssistantMessage>,
    chunks: ChunkAccumulator,
}

impl BlockAccumulator {
    /// Start accumulating into `output`
    #[must_use]
    pub fn new(output: AssistantMessage) -> Self {
        Self {
            current_index: None,
            current_block: BlockType::None,
            output: Arc::new(output),
            chunks: ChunkAccumulator::new(),
        }
    }

    /// Index of the most recently opened block
    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Kind of the open block
    #[must_use]
    pub const fn current_block(&self) -> BlockType {
        self.current_block
    }

    /// Shared snapshot of the message built so far
    #[must_use]
    pub fn snapshot(&self) -> Arc<AssistantMessage> {
        Arc::clone(&self.output)
    }

    /// Owned copy of the message built so far
    #[must_use]
    pub fn partial_message(&self) -> AssistantMessage {
        (*self.output).clone()
    }

    /// Fold one chunk into the message, returning the events it produced
    pub fn push(&mut self, chunk: &OpenAIStreamChunk) -> Vec<AssistantMessageEvent> {
        let mut events = Vec::new();
        for fragment in Fragment::split(chunk) {
            self.apply(&fragment, &mut events);
        }
        events
    }

    /// Close the block still open at end of stream
    pub fn finish(&mut self) -> Vec<AssistantMessageEvent> {
        let mut events = Vec::new();
        if let Some(block) = self.chunks.finish() {
            self.close_block(block, &mut events);
        }
        events
    }

    /// Take the final message
    #[must_use]
    pub fn into_message(self) -> AssistantMessage {
        Arc::try_unwrap(self.output).unwrap_or_else(|shared| (*shared).clone())
    }

    fn apply(&mut self, fragment: &Fragment<'_>, events: &mut Vec<AssistantMessageEvent>) {
        if let Some(reason) = fragment.finish_reason {
            Arc::make_mut(&mut self.output).stop_reason = StopReason::from_finish_reason(reason);
        }

        if let Some(block) = self.chunks.add(fragment) {
            self.close_block(block, events);
        }

        if !fragment.has_payload() {
            return;
        }

        if let Some(delta) = fragment.text {
            if self.current_block != BlockType::Text {
                let content_index = self.open_block(BlockType::Text);
                events.push(AssistantMessageEvent::TextStart {
                    content_index,
                    partial: self.snapshot(),
                });
            }
            events.push(AssistantMessageEvent::TextDelta {
                content_index: self.open_index(),
                delta: delta.to_string(),
                partial: self.snapshot(),
            });
        }

        for delta in fragment.tool_calls {
            if self.current_block != BlockType::ToolCall {
                let content_index = self.open_block(BlockType::ToolCall);
                events.push(AssistantMessageEvent::ToolcallStart {
                    content_index,
                    partial: self.snapshot(),
                });
            }
            if let Some(arguments) = delta.arguments() {
                events.push(AssistantMessageEvent::ToolcallDelta {
                    content_index: self.open_index(),
                    delta: arguments.to_string(),
                    partial: self.snapshot(),
                });
            }
        }
    }

    fn open_block(&mut self, block: BlockType) -> usize {
        let index = self.current_index.map_or(0, |index| index + 1);
        self.current_index = Some(index);
        self.current_block = block;
        tracing::trace!(index, ?block, "Opened content block");
        index
    }

    fn open_index(&self) -> usize {
        self.current_index.unwrap_or_default()
    }

    fn close_block(&mut self, block: FinishedBlock, events: &mut Vec<AssistantMessageEvent>) {
        let Some(content_index) = self.current_index else {
            tracing::warn!(?block, "Backend finished a block that was never opened");
            return;
        };

        let output = Arc::make_mut(&mut self.output);
        let event = match block {
            FinishedBlock::Text(text) => {
                output.contents.push(Content::text(text.clone()));
                AssistantMessageEvent::TextEnd {
                    content_index,
                    content: text,
                    partial: self.snapshot(),
                }
            }
            FinishedBlock::ToolCall(tool_call) => {
                output.contents.push(Content::ToolCall(tool_call.clone()));
                AssistantMessageEvent::ToolcallEnd {
                    content_index,
                    tool_call,
                    partial: self.snapshot(),
                }
            }
        };

        tracing::trace!(content_index, kind = event.kind(), "Closed content block");
        self.current_block = BlockType::None;
        events.push(event);
    }
}
