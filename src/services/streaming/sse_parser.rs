//! Server-Sent Events (SSE) parser
//!
//! Parses SSE streams following the W3C spec and decodes OpenAI-style
//! `data:` payloads into [`OpenAIStreamChunk`] fragments.

use async_stream::stream;
use futures::{Stream, StreamExt};

use crate::error::PiError;

use super::{FragmentStream, OpenAIStreamChunk, StreamPayload};

/// SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (e.g., "message", "error")
    pub event_type: Option<String>,

    /// Event data (JSON payload)
    pub data: String,

    /// Event ID (for reconnection)
    pub id: Option<String>,
}

impl SseEvent {
    /// Check if event is complete (has data)
    pub fn is_complete(&self) -> bool {
        !self.data.is_empty()
    }

    /// Check if this is the done marker for OpenAI streams
    pub fn is_done_marker(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    /// Decode the data payload into a stream chunk
    ///
    /// # Errors
    ///
    /// Returns [`PiError::Api`] for an in-band error object and
    /// [`PiError::Stream`] for anything that is not valid chunk JSON
    pub fn decode_chunk(&self) -> crate::error::Result<OpenAIStreamChunk> {
        let payload: StreamPayload = serde_json::from_str(&self.data)
            .map_err(|e| PiError::Stream(format!("Failed to parse SSE event: {e}")))?;

        match payload {
            StreamPayload::Chunk(chunk) => Ok(chunk),
            StreamPayload::Error { error } => Err(PiError::Api {
                provider: error.error_type.unwrap_or_else(|| "stream".to_string()),
                message: error.message,
            }),
        }
    }
}

/// SSE parser for streaming responses
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Current event being assembled
    current_event: SseEvent,

    /// Bytes of the incomplete trailing line
    line_buffer: Vec<u8>,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a chunk of SSE text
    pub fn parse_chunk(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.push(chunk.as_bytes())
    }

    /// Push raw bytes and return any completed events
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        self.line_buffer.extend_from_slice(bytes);

        while let Some(line_end) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.line_buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);

            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }

        events
    }

    /// Process a single line from the SSE stream
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line dispatches the event
        if line.is_empty() {
            if self.current_event.is_complete() {
                return Some(std::mem::take(&mut self.current_event));
            }
            self.current_event = SseEvent::default();
            return None;
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current_event.event_type = Some(value.to_string()),
            "data" => {
                if !self.current_event.data.is_empty() {
                    self.current_event.data.push('\n');
                }
                self.current_event.data.push_str(value);
            }
            "id" => self.current_event.id = Some(value.to_string()),
            _ => {}
        }

        None
    }

    /// Flush any remaining buffered event at end of input
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let raw = std::mem::take(&mut self.line_buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.process_line(line.trim_end_matches('\r'));
        }

        if self.current_event.is_complete() {
            Some(std::mem::take(&mut self.current_event))
        } else {
            None
        }
    }
}

/// Decode an SSE byte stream into a fragment stream
///
/// The stream ends at the `[DONE]` marker or at the end of the body, and
/// stops after yielding the first error.
pub fn fragment_stream<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<PiError> + Send + 'static,
{
    Box::pin(stream! {
        let mut body = Box::pin(body);
        let mut parser = SseParser::new();

        while let Some(bytes) = body.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(err) => {
                    yield Err(err.into());
                    return;
                }
            };

            for event in parser.push(bytes.as_ref()) {
                if event.is_done_marker() {
                    return;
                }
                let decoded = event.decode_chunk();
                let failed = decoded.is_err();
                yield decoded;
                if failed {
                    return;
                }
            }
        }

        if let Some(event) = parser.flush() {
            if !event.is_done_marker() {
                yield event.decode_chunk();
            }
        }
    })
}
