//! Streaming behavior tests for the Anthropic Messages client, backed by a
//! local mock server.

use futures::StreamExt;

use braid_abstraction::{
    ApiState, ChatMessage, ClientType, Platform, ProviderClient, Tool, TranscriptItem,
};
use braid_providers::AnthropicClient;

/// Builds an SSE body of `event:`/`data:` pairs the way the Messages API
/// frames them.
fn sse(events: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (event, data) in events {
        body.push_str("event: ");
        body.push_str(event);
        body.push_str("\ndata: ");
        body.push_str(data);
        body.push_str("\n\n");
    }
    body
}

fn platform_for(url: &str) -> Platform {
    Platform::new(ClientType::Anthropic, "claude-sonnet-4-20250514")
        .with_api_url(url)
        .with_token("test-key")
}

fn user_says(text: &str) -> Vec<TranscriptItem> {
    vec![TranscriptItem::Message(ChatMessage::user(text))]
}

#[tokio::test]
async fn text_deltas_stream_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            ("message_start", r#"{"type":"message_start","message":{"id":"msg_1","role":"assistant"}}"#),
            ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#),
            ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
            ("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#),
            ("message_stop", r#"{"type":"message_stop"}"#),
        ]))
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(
        states,
        vec![
            ApiState::Success { text: "Hel".to_string() },
            ApiState::Success { text: "lo".to_string() },
        ]
    );
    mock.assert();
}

#[tokio::test]
async fn tool_use_input_assembles_across_fragments() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[
            ("message_start", r#"{"type":"message_start","message":{"id":"msg_1"}}"#),
            ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Let me check."}}"#),
            ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
            ("content_block_start", r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"get_weather"}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"ci"}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"ty\": \"Seoul\"}"}}"#),
            ("content_block_stop", r#"{"type":"content_block_stop","index":1}"#),
            ("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#),
            ("message_stop", r#"{"type":"message_stop"}"#),
        ]))
        .create();

    let tool = Tool::new(
        "get_weather",
        "Current weather for a city",
        serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    );
    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("weather in Seoul?"), &[tool])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 2);
    assert!(matches!(&states[0], ApiState::Success { text } if text == "Let me check."));
    match &states[1] {
        ApiState::ToolCallRequested { calls } => {
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].id, "toolu_9");
            assert_eq!(calls[0].name, "get_weather");
            assert_eq!(calls[0].arguments, serde_json::json!({"city": "Seoul"}));
        }
        other => panic!("expected ToolCallRequested, got {:?}", other),
    }
}

#[tokio::test]
async fn thinking_deltas_map_to_thinking_units() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[
            ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Considering."}}"#),
            ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
            ("message_stop", r#"{"type":"message_stop"}"#),
        ]))
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hmm"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states, vec![ApiState::Thinking { text: "Considering.".to_string() }]);
}

#[tokio::test]
async fn unknown_events_are_skipped() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[
            ("ping", r#"{"type":"ping"}"#),
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ok"}}"#),
            ("new_event_kind", r#"{"type":"new_event_kind","payload":{}}"#),
            ("message_stop", r#"{"type":"message_stop"}"#),
        ]))
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states, vec![ApiState::Success { text: "ok".to_string() }]);
}

#[tokio::test]
async fn orphan_input_fragment_fails_the_stream() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[
            ("content_block_delta", r#"{"type":"content_block_delta","index":3,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#),
            ("message_stop", r#"{"type":"message_stop"}"#),
        ]))
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 1);
    assert!(
        matches!(&states[0], ApiState::Error { message } if message.contains("unknown tool block")),
        "got {:?}",
        states
    );
}

#[tokio::test]
async fn error_event_terminates_the_stream() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[
            ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"#),
            ("error", r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
        ]))
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 2);
    assert!(matches!(&states[1], ApiState::Error { message } if message == "Overloaded"));
}

#[tokio::test]
async fn error_status_maps_to_single_error_unit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(401)
        .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
        .create();

    let client = AnthropicClient::new();
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 1);
    assert!(matches!(&states[0], ApiState::Error { message } if message.contains("invalid x-api-key")));
}
