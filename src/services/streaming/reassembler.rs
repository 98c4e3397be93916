//! Tool-call argument reassembly
//!
//! Tool-call arguments arrive as arbitrary slices of a JSON document. The
//! reassembler concatenates them in arrival order and parses the result
//! once the call is complete.

use crate::messages::Arguments;

/// Buffer for one tool call's argument payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgumentReassembler {
    buffer: String,
}

impl ToolArgumentReassembler {
    /// Create an empty reassembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next argument fragment
    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Raw payload received so far
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    /// Whether no fragment has been received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Parse the reassembled payload
    ///
    /// Incomplete, malformed or non-object payloads resolve to an empty
    /// mapping.
    #[must_use]
    pub fn resolve(&self) -> Arguments {
        parse_arguments(&self.buffer)
    }
}

/// Parse a complete argument payload into a mapping, empty on failure
#[must_use]
pub fn parse_arguments(payload: &str) -> Arguments {
    if payload.trim().is_empty() {
        return Arguments::new();
    }

    match serde_json::from_str::<Arguments>(payload) {
        Ok(arguments) => arguments,
        Err(err) => {
            tracing::debug!(error = %err, payload_len = payload.len(), "Unparseable tool arguments, using empty mapping");
            Arguments::new()
        }
    }
}
