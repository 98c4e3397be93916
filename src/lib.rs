//! pi-ai: streaming LLM conversation core
//!
//! Talks to OpenAI-compatible chat-completions endpoints and turns their
//! incremental output into an ordered sequence of content-block events
//! plus one final assistant message.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod services;

// Re-exports for convenience
pub use error::{PiError, Result};
