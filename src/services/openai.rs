//! OpenAI chat-completions provider
//!
//! Supports:
//! - OpenAI official API
//! - OpenAI-compatible endpoints (NVIDIA NIM, self-hosted gateways, etc.)

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ProviderConfig, ProviderType},
    error::{PiError, Result},
    messages::{AssistantMessage, Content, Context, Message, StopReason, Tool, ToolCall},
};

use super::{
    streaming::{
        fragment_stream, reassembler::parse_arguments, spawn_event_stream, FragmentStream,
        OpenAIStreamChunk,
    },
    AssistantMessageEventStream, CompletionOptions, Provider,
};

/// Provider for one model behind an OpenAI-compatible endpoint
pub struct OpenAIProvider {
    provider_type: ProviderType,
    model: String,
    base_url: String,
    api_key: String,
    options: CompletionOptions,
    event_buffer: usize,
    /// Built on first use so that a bad key surfaces per request
    client: OnceCell<Client>,
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("provider_type", &self.provider_type)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAIProvider {
    /// Create a provider for `model` at `base_url`
    pub fn new(
        provider_type: ProviderType,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider_type,
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            options: CompletionOptions::default(),
            event_buffer: 1,
            client: OnceCell::new(),
        }
    }

    /// Create a provider from its configuration entry
    ///
    /// # Errors
    ///
    /// Returns [`PiError::UnsupportedProvider`] for providers that do not
    /// speak the chat-completions protocol and [`PiError::InvalidConfig`]
    /// when no endpoint is known
    pub fn from_config(
        provider_type: ProviderType,
        config: &ProviderConfig,
        model: impl Into<String>,
    ) -> Result<Self> {
        if !provider_type.is_openai_compatible() {
            return Err(PiError::UnsupportedProvider {
                provider: provider_type.to_string(),
            });
        }

        let base_url = config.effective_base_url(provider_type).ok_or_else(|| {
            PiError::InvalidConfig(format!("no base URL configured for {provider_type}"))
        })?;

        Ok(Self::new(provider_type, base_url, config.api_key.clone(), model))
    }

    /// Use these request options
    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the event channel capacity of streamed responses
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| {
            if self.api_key.trim().is_empty() {
                return Err(PiError::InvalidConfig(format!(
                    "missing API key for {}",
                    self.provider_type
                )));
            }

            let mut headers = header::HeaderMap::new();
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                    .map_err(|_| PiError::InvalidConfig("Invalid API key format".to_string()))?,
            );

            tracing::debug!(provider = %self.provider_type, base_url = %self.base_url, "Creating HTTP client");
            Ok(Client::builder().default_headers(headers).build()?)
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, context: &Context, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(system) = context.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::text("system", system));
        }
        messages.extend(context.messages.iter().filter_map(convert_message));

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: (!context.tools.is_empty())
                .then(|| context.tools.iter().map(ChatTool::from).collect()),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            stop: self.options.stop_sequences.clone(),
            seed: self.options.seed,
            stream,
        }
    }

    /// Fragment source for one streamed request
    fn fragment_source(&self, client: Client, request: ChatRequest) -> FragmentStream {
        let url = self.endpoint();
        let provider = self.provider_type;

        Box::pin(stream! {
            let response = match client.post(url).json(&request).send().await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(PiError::from(err));
                    return;
                }
            };

            let response = match check_status(provider, response).await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let mut fragments = fragment_stream(response.bytes_stream());
            while let Some(fragment) = fragments.next().await {
                yield fragment;
            }
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn stream(&self, context: &Context, cancel: CancellationToken) -> AssistantMessageEventStream {
        let initial = AssistantMessage::new(self.provider_type, &self.model);
        let source: FragmentStream = match self.client() {
            Ok(client) => self.fragment_source(client.clone(), self.build_request(context, true)),
            Err(err) => Box::pin(futures::stream::once(async move {
                Err::<OpenAIStreamChunk, _>(err)
            })),
        };

        spawn_event_stream(source, initial, cancel, self.event_buffer)
    }

    async fn complete(&self, context: &Context) -> Result<AssistantMessage> {
        let client = self.client()?;
        let request = self.build_request(context, false);

        tracing::debug!(provider = %self.provider_type, model = %self.model, messages = request.messages.len(), "Sending completion request");
        let response = client.post(self.endpoint()).json(&request).send().await?;
        let response = check_status(self.provider_type, response).await?;
        let body: ChatResponse = response.json().await?;

        let choice = body.choices.into_iter().next().ok_or_else(|| PiError::Api {
            provider: self.provider_type.to_string(),
            message: "No choices in response".to_string(),
        })?;

        let mut output = AssistantMessage::new(self.provider_type, &self.model);
        if let Some(reason) = choice.finish_reason.as_deref() {
            output.stop_reason = StopReason::from_finish_reason(reason);
        }
        if let Some(text) = choice.message.content.filter(|text| !text.is_empty()) {
            output.contents.push(Content::text(text));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            output.contents.push(Content::ToolCall(ToolCall {
                arguments: parse_arguments(&call.function.arguments),
                id: call.id,
                name: call.function.name,
            }));
        }

        Ok(output)
    }
}

/// Turn a non-success response into an API error
async fn check_status(provider: ProviderType, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PiError::Api {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {body}"),
    })
}

fn convert_message(message: &Message) -> Option<ChatMessage> {
    if message.contents().is_empty() {
        return None;
    }

    match message {
        Message::User { contents, .. } => Some(ChatMessage {
            role: "user".to_string(),
            content: Some(user_content(contents)),
            tool_calls: None,
            tool_call_id: None,
        }),
        Message::Assistant(assistant) => {
            let text = joined_text(&assistant.contents);
            let tool_calls: Vec<ChatToolCall> = assistant
                .tool_calls()
                .into_iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    call_type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: Value::Object(call.arguments.clone()).to_string(),
                    },
                })
                .collect();

            Some(ChatMessage {
                role: "assistant".to_string(),
                content: text.map(ChatContent::Text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            })
        }
        Message::ToolResult {
            tool_call_id,
            contents,
            ..
        } => Some(ChatMessage {
            role: "tool".to_string(),
            content: Some(ChatContent::Text(joined_text(contents).unwrap_or_default())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        }),
    }
}

fn joined_text(contents: &[Content]) -> Option<String> {
    let texts: Vec<&str> = contents.iter().filter_map(Content::as_text).collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

/// A lone text item is sent as a plain string, anything else as parts
fn user_content(contents: &[Content]) -> ChatContent {
    if let [Content::Text { text }] = contents {
        return ChatContent::Text(text.clone());
    }

    ChatContent::Parts(
        contents
            .iter()
            .filter_map(|content| match content {
                Content::Text { text } => Some(ContentPart::Text { text: text.clone() }),
                Content::Image { data, mime_type } => Some(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url(data, mime_type),
                    },
                }),
                Content::ToolCall(_) => None,
            })
            .collect(),
    )
}

fn image_url(data: &str, mime_type: &str) -> String {
    if data.starts_with("data:") || data.starts_with("http://") || data.starts_with("https://") {
        data.to_string()
    } else {
        format!("data:{mime_type};base64,{data}")
    }
}

// OpenAI API types

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    seed: i64,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ChatContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(ChatContent::Text(text.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    call_type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatFunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
struct ChatFunctionDef {
    name: String,
    description: String,
    parameters: Value,
    strict: bool,
}

impl From<&Tool> for ChatTool {
    fn from(tool: &Tool) -> Self {
        Self {
            tool_type: "function",
            function: ChatFunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
                strict: tool.strict,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}
