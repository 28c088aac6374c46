//! Streaming behavior tests for the OpenAI-compatible client, backed by a
//! local mock server.

use futures::StreamExt;

use braid_abstraction::{
    ApiState, ChatMessage, ClientType, Platform, ProviderClient, Tool, TranscriptItem,
};
use braid_providers::OpenAiClient;

fn sse(events: &[&str]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str("data: ");
        body.push_str(event);
        body.push_str("\n\n");
    }
    body
}

fn platform_for(url: &str) -> Platform {
    Platform::new(ClientType::OpenAi, "gpt-4o")
        .with_api_url(format!("{}/v1", url))
        .with_token("test-key")
}

fn user_says(text: &str) -> Vec<TranscriptItem> {
    vec![TranscriptItem::Message(ChatMessage::user(text))]
}

fn text_of(states: &[ApiState]) -> String {
    states
        .iter()
        .filter_map(|state| match state {
            ApiState::Success { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn text_deltas_stream_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]))
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
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
    assert_eq!(text_of(&states), "Hello");
    mock.assert();
}

#[tokio::test]
async fn malformed_chunks_are_skipped() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            "{this is not json",
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            "[DONE]",
        ]))
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(text_of(&states), "Hello");
    assert!(
        !states.iter().any(|s| matches!(s, ApiState::Error { .. })),
        "a skippable chunk must not fail the stream"
    );
}

#[tokio::test]
async fn fragmented_tool_call_is_assembled_at_done() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"ci"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\": \"Seoul\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]))
        .create();

    let tool = Tool::new(
        "get_weather",
        "Current weather for a city",
        serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    );
    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("weather in Seoul?"), &[tool])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 1);
    match &states[0] {
        ApiState::ToolCallRequested { calls } => {
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].id, "call_1");
            assert_eq!(calls[0].name, "get_weather");
            assert_eq!(calls[0].arguments, serde_json::json!({"city": "Seoul"}));
        }
        other => panic!("expected ToolCallRequested, got {:?}", other),
    }
}

#[tokio::test]
async fn tool_calls_flush_even_without_done_sentinel() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_time","arguments":"{}"}}]}}]}"#,
        ]))
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("time?"), &[])
        .await
        .collect()
        .await;

    assert!(
        matches!(&states[0], ApiState::ToolCallRequested { calls } if calls[0].name == "get_time"),
        "connection close must flush accumulated calls, got {:?}",
        states
    );
}

#[tokio::test]
async fn desynchronized_arguments_fail_the_stream() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":"{\"city\": "}}]}}]}"#,
            "[DONE]",
        ]))
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("weather?"), &[])
        .await
        .collect()
        .await;

    assert!(
        matches!(&states[0], ApiState::Error { .. }),
        "truncated arguments must surface as an error, got {:?}",
        states
    );
}

#[tokio::test]
async fn error_status_maps_to_single_error_unit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#)
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 1);
    match &states[0] {
        ApiState::Error { message } => assert!(message.contains("Incorrect API key")),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn in_stream_error_payload_terminates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse(&[
            r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
            r#"{"error":{"message":"The server had an error"}}"#,
        ]))
        .create();

    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform_for(&server.url()), &user_says("hi"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 2);
    assert!(matches!(&states[0], ApiState::Success { text } if text == "partial"));
    assert!(matches!(&states[1], ApiState::Error { message } if message.contains("server had an error")));
}

#[tokio::test]
async fn responses_endpoint_streams_text_and_calls() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/responses")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_body(sse(&[
            r#"{"type":"response.created"}"#,
            r#"{"type":"response.reasoning_summary_text.delta","delta":"Checking the forecast."}"#,
            r#"{"type":"response.output_text.delta","delta":"Hel"}"#,
            r#"{"type":"response.output_text.delta","delta":"lo"}"#,
            r#"{"type":"response.output_item.done","item":{"type":"function_call","call_id":"call_7","name":"get_weather","arguments":"{\"city\":\"Seoul\"}"}}"#,
            r#"{"type":"response.completed"}"#,
        ]))
        .create();

    let platform = platform_for(&server.url()).with_responses_api(true);
    let client = OpenAiClient::new(ClientType::OpenAi);
    let states: Vec<ApiState> = client
        .stream_chat(&platform, &user_says("weather?"), &[])
        .await
        .collect()
        .await;

    assert_eq!(states.len(), 4);
    assert!(matches!(&states[0], ApiState::Thinking { text } if text == "Checking the forecast."));
    assert_eq!(text_of(&states), "Hello");
    match &states[3] {
        ApiState::ToolCallRequested { calls } => {
            assert_eq!(calls[0].id, "call_7");
            assert_eq!(calls[0].arguments["city"], "Seoul");
        }
        other => panic!("expected ToolCallRequested, got {:?}", other),
    }
    mock.assert();
}
