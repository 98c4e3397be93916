//! CLI argument parsing and command routing

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use crate::{
    config::ProviderType,
    messages::{Context, Message, Tool, ToolCall},
};

/// pi-ai: stream conversations from OpenAI-compatible LLM endpoints
#[derive(Debug, Parser)]
#[command(name = "pi-ai")]
#[command(about = "Stream conversations from OpenAI-compatible LLM endpoints", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream a response, printing events as they arrive
    Stream(PromptArgs),

    /// Run a single-shot completion
    Complete(PromptArgs),

    /// List configured providers and models
    Models,

    /// Write the providers found in the environment to the settings file
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

/// Arguments shared by the prompt commands
#[derive(Debug, Clone, Args)]
pub struct PromptArgs {
    /// The prompt to send
    pub prompt: String,

    /// Provider to use
    #[arg(short, long, default_value = "nvidia")]
    pub provider: ProviderType,

    /// Model id (defaults to the provider's first configured model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Offer the demo `getWeather` tool and answer its calls
    #[arg(long)]
    pub with_tools: bool,

    /// Cancel the request after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl PromptArgs {
    /// Conversation context for this invocation
    #[must_use]
    pub fn context(&self) -> Context {
        let mut context = Context {
            system_prompt: self.system.clone(),
            ..Context::default()
        };
        context.push(Message::user(self.prompt.clone()));
        if self.with_tools {
            context.tools = demo_tools();
        }
        context
    }
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Tools offered by `--with-tools`
#[must_use]
pub fn demo_tools() -> Vec<Tool> {
    vec![Tool {
        name: "getWeather".to_string(),
        description: "Get the weather for a given location".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "location": {"type": "string"}
            },
            "required": ["location"]
        }),
        strict: false,
    }]
}

/// Canned answer to a demo tool call
#[must_use]
pub fn demo_tool_result(call: &ToolCall) -> Message {
    let location = call
        .arguments
        .get("location")
        .and_then(|value| value.as_str())
        .unwrap_or("an unknown place");
    Message::tool_result(call, format!("Weather in {location}: 22°C, partly cloudy"))
}
