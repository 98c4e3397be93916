//! Wire-level chunk accumulation
//!
//! Collects the text and tool-call data carried by OpenAI stream chunks and
//! reports when a content block has just finished. A block finishes when a
//! different kind of payload (or a different tool call) follows it, when a
//! payload-free chunk carries a finish reason, or when the stream ends.
//!
//! Builders stay keyed by wire index until the stream ends, so a call that
//! resumes after another call interrupted it keeps its id and name and is
//! reported again with its full argument payload.
//!
//! Only the first tool delta of a fragment decides the current call. A call
//! that appears solely as a later delta inside a shared fragment never
//! becomes current and is dropped at [`ChunkAccumulator::finish`]; its
//! argument deltas were still reported under the open block's index, so
//! for that index the concatenated deltas do not match the finished call.

use std::collections::BTreeMap;

use crate::messages::ToolCall;

use super::{OpenAIStreamChunk, ToolArgumentReassembler, ToolCallDelta};

/// One unit of incremental output, as seen by the block accumulator
///
/// A chunk carrying both text and tool-call deltas is split into two
/// fragments (text first), so each fragment has at most one payload kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment<'a> {
    pub text: Option<&'a str>,
    pub tool_calls: &'a [ToolCallDelta],
    pub finish_reason: Option<&'a str>,
}

impl<'a> Fragment<'a> {
    /// Split the first choice of a chunk into fragments
    #[must_use]
    pub fn split(chunk: &'a OpenAIStreamChunk) -> Vec<Self> {
        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };

        let text = choice.delta.content.as_deref().filter(|text| !text.is_empty());
        let tool_calls = choice.delta.tool_calls.as_deref().unwrap_or_default();
        let finish_reason = choice.finish_reason.as_deref().filter(|reason| !reason.is_empty());

        if text.is_some() && !tool_calls.is_empty() {
            return vec![
                Self {
                    text,
                    tool_calls: &[],
                    finish_reason: None,
                },
                Self {
                    text: None,
                    tool_calls,
                    finish_reason,
                },
            ];
        }

        vec![Self {
            text,
            tool_calls,
            finish_reason,
        }]
    }

    /// Whether the fragment carries a text or tool-call delta
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.text.is_some() || !self.tool_calls.is_empty()
    }
}

/// A content block reported as complete
#[derive(Debug, Clone, PartialEq)]
pub enum FinishedBlock {
    Text(String),
    ToolCall(ToolCall),
}

/// What the most recent payload was building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Idle,
    Text,
    ToolCall(usize),
    Finished,
}

/// Tool call being assembled from deltas
#[derive(Debug, Clone, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: ToolArgumentReassembler,
    /// Closed at least once as the current call
    reported: bool,
}

impl ToolCallBuilder {
    fn apply(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            self.id = id.to_string();
        }
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|name| !name.is_empty()) {
                self.name = name.to_string();
            }
        }
        if let Some(arguments) = delta.arguments() {
            self.arguments.push(arguments);
        }
    }

    fn build(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.resolve(),
        }
    }
}

/// Accumulator for OpenAI stream chunks
#[derive(Debug)]
pub struct ChunkAccumulator {
    /// Text of the block currently being streamed
    text: String,

    /// Tool calls being assembled (wire index -> builder)
    tool_calls: BTreeMap<usize, ToolCallBuilder>,

    state: ResponseState,
}

impl ChunkAccumulator {
    /// Create a new accumulator
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            tool_calls: BTreeMap::new(),
            state: ResponseState::Idle,
        }
    }

    /// Accumulate a fragment
    ///
    /// Returns the block that this fragment just finished, if any. The
    /// finished block never contains this fragment's own payload.
    pub fn add(&mut self, fragment: &Fragment<'_>) -> Option<FinishedBlock> {
        let next = if fragment.text.is_some() {
            Some(ResponseState::Text)
        } else {
            fragment
                .tool_calls
                .first()
                .map(|delta| ResponseState::ToolCall(delta.index))
        };

        let finished = match next {
            Some(state) if state != self.state => {
                let finished = self.close_current();
                self.state = state;
                finished
            }
            None if fragment.finish_reason.is_some() => {
                let finished = self.close_current();
                self.state = ResponseState::Finished;
                finished
            }
            _ => None,
        };

        if let Some(text) = fragment.text {
            self.text.push_str(text);
        }
        for delta in fragment.tool_calls {
            self.tool_calls.entry(delta.index).or_default().apply(delta);
        }

        finished
    }

    /// Close whatever is still open at end of stream
    pub fn finish(&mut self) -> Option<FinishedBlock> {
        let finished = self.close_current();
        self.state = ResponseState::Finished;

        let builders = std::mem::take(&mut self.tool_calls);
        for (index, orphan) in builders.into_iter().filter(|(_, builder)| !builder.reported) {
            tracing::warn!(
                wire_index = index,
                id = %orphan.id,
                name = %orphan.name,
                "Dropping tool call that never opened its own content block"
            );
        }

        finished
    }

    /// Text of the block currently being streamed
    #[must_use]
    pub fn current_text(&self) -> &str {
        &self.text
    }

    fn close_current(&mut self) -> Option<FinishedBlock> {
        match self.state {
            ResponseState::Text => {
                let text = std::mem::take(&mut self.text);
                (!text.is_empty()).then_some(FinishedBlock::Text(text))
            }
            ResponseState::ToolCall(index) => self.tool_calls.get_mut(&index).map(|builder| {
                builder.reported = true;
                FinishedBlock::ToolCall(builder.build())
            }),
            ResponseState::Idle | ResponseState::Finished => None,
        }
    }
}

impl Default for ChunkAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{finish, role_only, text, tool, tool_delta, tools};
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn feed(acc: &mut ChunkAccumulator, chunk: &OpenAIStreamChunk) -> Vec<FinishedBlock> {
        Fragment::split(chunk)
            .iter()
            .filter_map(|fragment| acc.add(fragment))
            .collect()
    }

    #[test]
    fn test_text_finishes_on_finish_reason() {
        let mut acc = ChunkAccumulator::new();
        assert!(feed(&mut acc, &role_only()).is_empty());
        assert!(feed(&mut acc, &text("Hello")).is_empty());
        assert!(feed(&mut acc, &text(" world")).is_empty());
        assert_eq!(acc.current_text(), "Hello world");

        assert_eq!(
            feed(&mut acc, &finish("stop")),
            vec![FinishedBlock::Text("Hello world".into())]
        );
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn test_text_finishes_when_tool_call_starts() {
        let mut acc = ChunkAccumulator::new();
        feed(&mut acc, &text("Checking"));

        let finished = feed(&mut acc, &tool(0, Some("call_1"), Some("getWeather"), "{\"location\":"));
        assert_eq!(finished, vec![FinishedBlock::Text("Checking".into())]);

        feed(&mut acc, &tool(0, None, None, "\"Tokyo\"}"));
        match feed(&mut acc, &finish("tool_calls")).as_slice() {
            [FinishedBlock::ToolCall(call)] => {
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "getWeather");
                assert_eq!(json!(call.arguments), json!({"location": "Tokyo"}));
            }
            other => panic!("Expected one finished tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_new_wire_index_finishes_previous_call() {
        let mut acc = ChunkAccumulator::new();
        feed(&mut acc, &tool(0, Some("a"), Some("first"), "{}"));

        let finished = feed(&mut acc, &tool(1, Some("b"), Some("second"), "{}"));
        assert!(matches!(finished.as_slice(), [FinishedBlock::ToolCall(call)] if call.id == "a"));

        assert!(matches!(acc.finish(), Some(FinishedBlock::ToolCall(call)) if call.id == "b"));
    }

    #[test]
    fn test_mixed_chunk_is_split_text_first() {
        let mut chunk = text("Sure.");
        chunk.choices[0].delta.tool_calls = Some(vec![tool_delta(0, Some("c"), Some("f"), "")]);
        chunk.choices[0].finish_reason = Some("tool_calls".into());

        let fragments = Fragment::split(&chunk);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, Some("Sure."));
        assert!(fragments[0].tool_calls.is_empty());
        assert_eq!(fragments[0].finish_reason, None);
        assert_eq!(fragments[1].text, None);
        assert_eq!(fragments[1].finish_reason, Some("tool_calls"));

        let mut acc = ChunkAccumulator::new();
        assert_eq!(feed(&mut acc, &chunk), vec![FinishedBlock::Text("Sure.".into())]);
    }

    #[test]
    fn test_payload_with_finish_reason_stays_open() {
        let mut chunk = text("tail");
        chunk.choices[0].finish_reason = Some("length".into());

        let mut acc = ChunkAccumulator::new();
        assert!(feed(&mut acc, &chunk).is_empty());
        assert_eq!(acc.finish(), Some(FinishedBlock::Text("tail".into())));
    }

    #[test]
    fn test_same_fragment_calls_share_state() {
        let mut acc = ChunkAccumulator::new();
        feed(
            &mut acc,
            &tools(vec![
                tool_delta(0, Some("a"), Some("first"), "{}"),
                tool_delta(1, Some("b"), Some("second"), "{}"),
            ]),
        );

        // The second call never became the current one, so only the first
        // is reported.
        assert!(matches!(acc.finish(), Some(FinishedBlock::ToolCall(call)) if call.id == "a"));
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn test_resumed_call_keeps_id_and_name() {
        let mut acc = ChunkAccumulator::new();
        feed(&mut acc, &tool(0, Some("a"), Some("f"), "{\"x\":"));
        feed(&mut acc, &tool(1, Some("b"), Some("g"), "{\"y\":2}"));
        feed(&mut acc, &tool(0, None, None, "1}"));

        match acc.finish() {
            Some(FinishedBlock::ToolCall(call)) => {
                assert_eq!(call.id, "a");
                assert_eq!(call.name, "f");
                assert_eq!(json!(call.arguments), json!({"x": 1}));
            }
            other => panic!("Expected resumed tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_chunks_are_ignored() {
        let mut acc = ChunkAccumulator::new();
        let empty = OpenAIStreamChunk::default();
        assert!(Fragment::split(&empty).is_empty());
        assert!(feed(&mut acc, &role_only()).is_empty());
        assert_eq!(acc.finish(), None);
    }
}
