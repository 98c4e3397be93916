// End-to-end tests for the OpenAI-compatible provider.
//
// A wiremock server stands in for the chat-completions endpoint and serves
// canned SSE bodies; the provider is driven through the public `Provider`
// trait exactly as an application would.

use pi_ai::{
    config::ProviderType,
    messages::{Content, Context, Message, StopReason, Tool},
    services::{streaming::AssistantMessageEvent, OpenAIProvider, Provider},
    PiError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "openai/gpt-oss-20b";

fn provider(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::new(ProviderType::Nvidia, format!("{}/v1", server.uri()), "nvapi-test", MODEL)
}

fn sse(chunks: &[serde_json::Value]) -> String {
    let mut body: String = chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\n\n"))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn chunk(delta: serde_json::Value, finish_reason: Option<&str>) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": MODEL,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
}

async fn mount_sse(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer nvapi-test"))
        .and(body_partial_json(json!({"stream": true, "seed": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

fn kinds(events: &[AssistantMessageEvent]) -> Vec<&'static str> {
    events.iter().map(AssistantMessageEvent::kind).collect()
}

#[tokio::test]
async fn test_stream_text_response() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        sse(&[
            chunk(json!({"role": "assistant", "content": ""}), None),
            chunk(json!({"content": "Hello, "}), None),
            chunk(json!({"content": "world"}), None),
            chunk(json!({}), Some("stop")),
        ]),
    )
    .await;

    let mut context = Context::with_system_prompt("Be brief.");
    context.push(Message::user("Say hello"));

    let (events, outcome) = provider(&server)
        .stream(&context, CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        kinds(&events),
        vec!["start", "text_start", "text_delta", "text_delta", "text_end", "done"]
    );
    let message = outcome.unwrap();
    assert_eq!(message.contents, vec![Content::text("Hello, world")]);
    assert_eq!(message.stop_reason, StopReason::Stop);
    assert_eq!(message.provider, ProviderType::Nvidia);
    assert_eq!(message.model, MODEL);
}

#[tokio::test]
async fn test_stream_text_then_tool_call() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        sse(&[
            chunk(json!({"content": "Checking the weather."}), None),
            chunk(
                json!({"tool_calls": [{
                    "index": 0, "id": "call_1", "type": "function",
                    "function": {"name": "getWeather", "arguments": ""}
                }]}),
                None,
            ),
            chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"location\":"}}]}),
                None,
            ),
            chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"Tokyo\"}"}}]}),
                None,
            ),
            chunk(json!({}), Some("tool_calls")),
        ]),
    )
    .await;

    let mut context = Context::default();
    context.push(Message::user("Weather in Tokyo?"));
    context.tools.push(Tool {
        name: "getWeather".into(),
        description: "Get the weather for a given location".into(),
        parameters: json!({"type": "object", "properties": {"location": {"type": "string"}}}),
        strict: false,
    });

    let (events, outcome) = provider(&server)
        .stream(&context, CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        kinds(&events),
        vec![
            "start",
            "text_start",
            "text_delta",
            "text_end",
            "toolcall_start",
            "toolcall_delta",
            "toolcall_delta",
            "toolcall_end",
            "done"
        ]
    );

    let indices: Vec<Option<usize>> = events.iter().map(AssistantMessageEvent::content_index).collect();
    assert_eq!(
        indices,
        vec![None, Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), Some(1), None]
    );

    let message = outcome.unwrap();
    assert_eq!(message.stop_reason, StopReason::ToolUse);
    assert_eq!(message.contents.len(), 2);
    let call = message.contents[1].as_tool_call().unwrap();
    assert_eq!(call.id, "call_1");
    assert_eq!(call.name, "getWeather");
    assert_eq!(json!(call.arguments), json!({"location": "Tokyo"}));
}

#[tokio::test]
async fn test_stream_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let (events, outcome) = provider(&server)
        .stream(&Context::default(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(kinds(&events), vec!["start", "error"]);
    match outcome {
        Err(PiError::Api { provider, message }) => {
            assert_eq!(provider, "nvidia");
            assert!(message.contains("401"), "{message}");
            assert!(message.contains("invalid api key"), "{message}");
        }
        other => panic!("Expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_in_band_error() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {}\n\n",
        chunk(json!({"content": "par"}), None),
        json!({"error": {"message": "model overloaded", "type": "server_error"}})
    );
    mount_sse(&server, body).await;

    let (events, outcome) = provider(&server)
        .stream(&Context::default(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(kinds(&events), vec!["start", "text_start", "text_delta", "error"]);
    assert!(matches!(outcome, Err(PiError::Api { message, .. }) if message == "model overloaded"));
}

#[tokio::test]
async fn test_stream_cancelled_before_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse(&[chunk(json!({"content": "late"}), Some("stop"))]), "text/event-stream")
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let mut stream = provider(&server).stream(&Context::default(), cancel.clone());
    assert!(matches!(stream.next().await, Some(AssistantMessageEvent::Start)));

    cancel.cancel();
    let (rest, outcome) = stream.collect().await;
    assert!(rest.is_empty());
    assert!(matches!(outcome, Err(PiError::Cancelled)));
}

#[tokio::test]
async fn test_complete_parses_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": false, "model": MODEL})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": MODEL,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Let me look that up.",
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {"name": "getWeather", "arguments": "{\"location\":\"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let mut context = Context::default();
    context.push(Message::user("Weather in Paris?"));
    let message = provider(&server).complete(&context).await.unwrap();

    assert_eq!(message.stop_reason, StopReason::ToolUse);
    assert_eq!(message.text(), "Let me look that up.");
    let calls = message.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].arguments["location"], "Paris");
}

#[tokio::test]
async fn test_complete_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&Context::default()).await.unwrap_err();
    assert!(matches!(err, PiError::Api { ref message, .. } if message.starts_with("HTTP 500")));
}
