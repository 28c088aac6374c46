//! OpenAI-compatible streaming client.
//!
//! Speaks the chat/completions SSE protocol used by OpenAI, Groq, Ollama,
//! OpenRouter, and custom endpoints, plus the OpenAI Responses API when a
//! platform opts into it. Tool-call argument fragments are accumulated per
//! array index and parsed only once the call is complete.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use braid_abstraction::{
    ApiError, ApiState, ApiStateStream, ChatRole, ClientType, Platform, ProviderClient, Tool,
    ToolCall, TranscriptItem,
};

use crate::convert::{convert_tools_for_provider, responses_tool_defs, ProviderTools};
use crate::error_stream;

/// Streaming client for the OpenAI-compatible provider family.
pub struct OpenAiClient {
    client: reqwest::Client,
    client_type: ClientType,
}

impl OpenAiClient {
    /// Creates a client for one OpenAI-compatible provider.
    #[must_use]
    pub fn new(client_type: ClientType) -> Self {
        Self::with_client(client_type, reqwest::Client::new())
    }

    /// Creates a client sharing an existing HTTP connection pool.
    #[must_use]
    pub const fn with_client(client_type: ClientType, client: reqwest::Client) -> Self {
        Self { client, client_type }
    }

    /// Joins a base URL and path, tolerating base URLs with and without a
    /// trailing slash.
    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }

    /// Maps the unified transcript into chat/completions wire messages.
    fn build_messages(platform: &Platform, transcript: &[TranscriptItem]) -> Vec<WireMessage> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = &platform.system_prompt {
            if !system_prompt.is_empty() {
                messages.push(WireMessage {
                    role: "system",
                    content: Some(WireContent::Text(system_prompt.clone())),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }

        for item in transcript {
            match item {
                TranscriptItem::Message(msg) => {
                    let role = match msg.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                        ChatRole::System => "system",
                    };
                    let content = if msg.images.is_empty() {
                        WireContent::Text(msg.content.clone())
                    } else {
                        let mut parts =
                            vec![WireContentPart::Text { text: msg.content.clone() }];
                        parts.extend(msg.images.iter().map(|img| WireContentPart::ImageUrl {
                            image_url: WireImageUrl {
                                url: format!("data:{};base64,{}", img.mime_type, img.base64_data),
                            },
                        }));
                        WireContent::Parts(parts)
                    };
                    messages.push(WireMessage {
                        role,
                        content: Some(content),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                TranscriptItem::ToolCalls { assistant_text, calls } => {
                    let content = if assistant_text.is_empty() {
                        None
                    } else {
                        Some(WireContent::Text(assistant_text.clone()))
                    };
                    let wire_calls = calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            call_type: "function",
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect();
                    messages.push(WireMessage {
                        role: "assistant",
                        content,
                        tool_calls: Some(wire_calls),
                        tool_call_id: None,
                    });
                }
                TranscriptItem::ToolResults(results) => {
                    for result in results {
                        messages.push(WireMessage {
                            role: "tool",
                            content: Some(WireContent::Text(result.output.clone())),
                            tool_calls: None,
                            tool_call_id: Some(result.call_id.clone()),
                        });
                    }
                }
            }
        }

        messages
    }

    fn build_request(
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ChatCompletionRequest {
        let provider_tools = convert_tools_for_provider(tools, platform.client_type);
        ChatCompletionRequest {
            model: platform.model.clone(),
            messages: Self::build_messages(platform, transcript),
            stream: true,
            temperature: platform.temperature,
            top_p: platform.top_p,
            max_tokens: platform.max_tokens,
            tools: if provider_tools.is_empty() { None } else { Some(provider_tools) },
        }
    }

    /// Maps the unified transcript into Responses API input items.
    fn build_responses_input(transcript: &[TranscriptItem]) -> Vec<ResponsesInputItem> {
        let mut input = Vec::new();
        for item in transcript {
            match item {
                TranscriptItem::Message(msg) => {
                    if !msg.images.is_empty() {
                        debug!("dropping image attachments: not mapped on the responses endpoint");
                    }
                    let role = match msg.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                        ChatRole::System => "system",
                    };
                    input.push(ResponsesInputItem::Message { role, content: msg.content.clone() });
                }
                TranscriptItem::ToolCalls { assistant_text, calls } => {
                    if !assistant_text.is_empty() {
                        input.push(ResponsesInputItem::Message {
                            role: "assistant",
                            content: assistant_text.clone(),
                        });
                    }
                    for call in calls {
                        input.push(ResponsesInputItem::FunctionCall {
                            item_type: "function_call",
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        });
                    }
                }
                TranscriptItem::ToolResults(results) => {
                    for result in results {
                        input.push(ResponsesInputItem::FunctionCallOutput {
                            item_type: "function_call_output",
                            call_id: result.call_id.clone(),
                            output: result.output.clone(),
                        });
                    }
                }
            }
        }
        input
    }

    fn build_responses_request(
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ResponsesRequest {
        let tool_defs = responses_tool_defs(tools);
        ResponsesRequest {
            model: platform.model.clone(),
            input: Self::build_responses_input(transcript),
            stream: true,
            instructions: platform.system_prompt.clone().filter(|s| !s.is_empty()),
            temperature: platform.temperature,
            top_p: platform.top_p,
            max_output_tokens: platform.max_tokens,
            tools: if tool_defs.is_empty() { None } else { Some(tool_defs) },
        }
    }

    /// Sends a POST and hands the byte stream to `make_stream`, translating
    /// connection failures and non-2xx responses into a terminal error unit.
    async fn open_stream<F>(
        &self,
        url: String,
        body: serde_json::Value,
        token: Option<&str>,
        make_stream: F,
    ) -> ApiStateStream
    where
        F: FnOnce(reqwest::Response) -> ApiStateStream,
    {
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, url = %url, "failed to open stream");
                return error_stream(format!("Network error: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .map_or_else(|_| format!("HTTP {}: {}", status.as_u16(), body), |e| e.error.message);
            error!(status = %status, error = %message, "provider returned error status");
            return error_stream(message);
        }

        make_stream(response)
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn client_type(&self) -> ClientType {
        self.client_type
    }

    async fn stream_chat(
        &self,
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ApiStateStream {
        if platform.responses_api {
            let request = Self::build_responses_request(platform, transcript, tools);
            let url = Self::endpoint(&platform.api_url, "responses");
            debug!(
                model = %platform.model,
                input_count = request.input.len(),
                tool_count = tools.len(),
                "opening responses stream"
            );
            let body = match serde_json::to_value(&request) {
                Ok(body) => body,
                Err(e) => return error_stream(ApiError::Serialization(e.to_string()).to_string()),
            };
            self.open_stream(url, body, platform.token.as_deref(), |response| {
                Box::pin(ResponsesEventStream::new(response))
            })
            .await
        } else {
            let request = Self::build_request(platform, transcript, tools);
            let url = Self::endpoint(&platform.api_url, "chat/completions");
            debug!(
                model = %platform.model,
                message_count = request.messages.len(),
                tool_count = tools.len(),
                "opening chat/completions stream"
            );
            let body = match serde_json::to_value(&request) {
                Ok(body) => body,
                Err(e) => return error_stream(ApiError::Serialization(e.to_string()).to_string()),
            };
            self.open_stream(url, body, platform.token.as_deref(), |response| {
                Box::pin(ChatCompletionsStream::new(response))
            })
            .await
        }
    }
}

/// Accumulates fragmented tool-call deltas keyed by array index.
///
/// Arguments arrive as string fragments spread across many chunks; they are
/// concatenated here and parsed as JSON only when the stream marks the calls
/// complete. Never partially parsed.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    pending: HashMap<usize, PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ToolCallDelta) {
        let entry = self.pending.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name = name;
            }
            if let Some(fragment) = function.arguments {
                entry.arguments.push_str(&fragment);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Parses every accumulated call, in array-index order.
    ///
    /// A parse failure here means the accumulation desynchronized, which
    /// fails the whole stream rather than silently dropping a call.
    fn finalize(&mut self) -> Result<Vec<ToolCall>, ApiError> {
        let mut entries: Vec<(usize, PendingToolCall)> = self.pending.drain().collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
            .into_iter()
            .map(|(index, pending)| {
                let arguments = if pending.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&pending.arguments).map_err(|e| {
                        ApiError::MalformedChunk(format!(
                            "tool call arguments at index {} did not parse: {}",
                            index, e
                        ))
                    })?
                };
                let id = if pending.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4())
                } else {
                    pending.id
                };
                Ok(ToolCall { id, name: pending.name, arguments })
            })
            .collect()
    }
}

/// SSE parser for the chat/completions protocol.
struct ChatCompletionsStream {
    stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    accumulator: ToolCallAccumulator,
    done: bool,
}

impl ChatCompletionsStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            accumulator: ToolCallAccumulator::default(),
            done: false,
        }
    }

    /// Terminates the stream, flushing any accumulated tool calls first.
    fn finish(&mut self) -> Option<ApiState> {
        self.done = true;
        if self.accumulator.is_empty() {
            return None;
        }
        match self.accumulator.finalize() {
            Ok(calls) => Some(ApiState::ToolCallRequested { calls }),
            Err(e) => {
                error!(error = %e, "tool call accumulation failed");
                Some(ApiState::Error { message: e.to_string() })
            }
        }
    }

    /// Processes one complete SSE event, returning a unit to emit if any.
    fn handle_event(&mut self, event: &str) -> Option<ApiState> {
        let data = event.lines().find_map(|line| line.strip_prefix("data: "))?;

        if data.trim() == "[DONE]" {
            return self.finish();
        }

        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    self.done = true;
                    return Some(ApiState::Error { message: err.message });
                }

                let mut emitted = None;
                for choice in chunk.choices {
                    if let Some(deltas) = choice.delta.tool_calls {
                        for delta in deltas {
                            self.accumulator.apply(delta);
                        }
                    }
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            emitted = Some(ApiState::Success { text });
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        debug!(finish_reason = %reason, "chat/completions choice finished");
                    }
                }
                emitted
            }
            Err(e) => {
                // Some servers interleave keep-alive or partial frames; skip them.
                debug!(error = %e, "skipping malformed chat/completions chunk");
                None
            }
        }
    }
}

impl Stream for ChatCompletionsStream {
    type Item = ApiState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            // Process complete SSE events (separated by \n\n) already buffered.
            while let Some(end_idx) = self.buffer.find("\n\n") {
                let event = self.buffer[..end_idx].to_string();
                self.buffer = self.buffer[end_idx + 2..].to_string();

                if let Some(state) = self.handle_event(&event) {
                    return Poll::Ready(Some(state));
                }
                if self.done {
                    return Poll::Ready(None);
                }
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(chunk) => self.buffer.push_str(&chunk),
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(ApiState::Error {
                            message: format!("Failed to decode SSE chunk: {}", e),
                        }));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(ApiState::Error {
                        message: format!("Stream error: {}", e),
                    }));
                }
                Poll::Ready(None) => {
                    // Connection closed without [DONE]; drain any final event.
                    if !self.buffer.trim().is_empty() {
                        let event = std::mem::take(&mut self.buffer);
                        if let Some(state) = self.handle_event(event.trim_end()) {
                            return Poll::Ready(Some(state));
                        }
                        if self.done {
                            return Poll::Ready(None);
                        }
                    }
                    return match self.finish() {
                        Some(state) => Poll::Ready(Some(state)),
                        None => Poll::Ready(None),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// SSE parser for the Responses API protocol.
struct ResponsesEventStream {
    stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    staged: Vec<ToolCall>,
    done: bool,
}

impl ResponsesEventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            staged: Vec::new(),
            done: false,
        }
    }

    fn finish(&mut self) -> Option<ApiState> {
        self.done = true;
        if self.staged.is_empty() {
            return None;
        }
        Some(ApiState::ToolCallRequested { calls: std::mem::take(&mut self.staged) })
    }

    /// Stages a completed function-call output item.
    fn stage_item(&mut self, item: ResponsesOutputItem) -> Option<ApiState> {
        if item.item_type != "function_call" {
            return None;
        }
        let raw = item.arguments.unwrap_or_default();
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    self.done = true;
                    return Some(ApiState::Error {
                        message: format!("function call arguments did not parse: {}", e),
                    });
                }
            }
        };
        let id = item
            .call_id
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
        self.staged.push(ToolCall { id, name: item.name.unwrap_or_default(), arguments });
        None
    }

    fn handle_event(&mut self, event: &str) -> Option<ApiState> {
        // The data payload repeats the event type, so dispatch on it alone.
        let data = event.lines().find_map(|line| line.strip_prefix("data: "))?;

        match serde_json::from_str::<ResponsesStreamEvent>(data) {
            Ok(ResponsesStreamEvent::OutputTextDelta { delta }) => {
                if delta.is_empty() {
                    None
                } else {
                    Some(ApiState::Success { text: delta })
                }
            }
            Ok(ResponsesStreamEvent::ReasoningSummaryTextDelta { delta }) => {
                if delta.is_empty() {
                    None
                } else {
                    Some(ApiState::Thinking { text: delta })
                }
            }
            Ok(ResponsesStreamEvent::OutputItemDone { item }) => self.stage_item(item),
            Ok(ResponsesStreamEvent::Completed) => self.finish(),
            Ok(ResponsesStreamEvent::Failed { response }) => {
                self.done = true;
                let message = response
                    .and_then(|r| r.error)
                    .map_or_else(|| "response failed".to_string(), |e| e.message);
                Some(ApiState::Error { message })
            }
            Ok(ResponsesStreamEvent::Unknown) => None,
            Err(e) => {
                debug!(error = %e, "skipping malformed responses event");
                None
            }
        }
    }
}

impl Stream for ResponsesEventStream {
    type Item = ApiState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            while let Some(end_idx) = self.buffer.find("\n\n") {
                let event = self.buffer[..end_idx].to_string();
                self.buffer = self.buffer[end_idx + 2..].to_string();

                if let Some(state) = self.handle_event(&event) {
                    return Poll::Ready(Some(state));
                }
                if self.done {
                    return Poll::Ready(None);
                }
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(chunk) => self.buffer.push_str(&chunk),
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(ApiState::Error {
                            message: format!("Failed to decode SSE chunk: {}", e),
                        }));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(ApiState::Error {
                        message: format!("Stream error: {}", e),
                    }));
                }
                Poll::Ready(None) => {
                    if !self.buffer.trim().is_empty() {
                        let event = std::mem::take(&mut self.buffer);
                        if let Some(state) = self.handle_event(event.trim_end()) {
                            return Poll::Ready(Some(state));
                        }
                        if self.done {
                            return Poll::Ready(None);
                        }
                    }
                    return match self.finish() {
                        Some(state) => Poll::Ready(Some(state)),
                        None => Poll::Ready(None),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// Wire format: chat/completions request

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<ProviderTools>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WireContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentPart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    /// Serialized JSON, per the wire protocol.
    arguments: String,
}

// Wire format: chat/completions streaming chunks

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<WireErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

// Wire format: Responses API

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<ResponsesInputItem>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<crate::convert::ResponsesToolDef>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ResponsesInputItem {
    FunctionCall {
        #[serde(rename = "type")]
        item_type: &'static str,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(rename = "type")]
        item_type: &'static str,
        call_id: String,
        output: String,
    },
    Message {
        role: &'static str,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesStreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta { delta: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: ResponsesOutputItem },
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "response.failed")]
    Failed { response: Option<FailedResponse> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    item_type: String,
    call_id: Option<String>,
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailedResponse {
    error: Option<WireErrorBody>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_abstraction::{ChatMessage, ToolResult};

    #[test]
    fn endpoint_join_tolerates_trailing_slash() {
        assert_eq!(
            OpenAiClient::endpoint("https://api.openai.com/v1/", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAiClient::endpoint("https://api.openai.com/v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn accumulator_assembles_fragmented_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.apply(ToolCallDelta {
            index: 0,
            id: Some("call_abc".to_string()),
            function: Some(FunctionDelta {
                name: Some("get_weather".to_string()),
                arguments: Some("{\"ci".to_string()),
            }),
        });
        acc.apply(ToolCallDelta {
            index: 0,
            id: None,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some("ty\": \"Seoul\"}".to_string()),
            }),
        });

        let calls = acc.finalize().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments["city"], "Seoul");
    }

    #[test]
    fn accumulator_orders_parallel_calls_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.apply(ToolCallDelta {
            index: 1,
            id: Some("call_b".to_string()),
            function: Some(FunctionDelta {
                name: Some("second".to_string()),
                arguments: Some("{}".to_string()),
            }),
        });
        acc.apply(ToolCallDelta {
            index: 0,
            id: Some("call_a".to_string()),
            function: Some(FunctionDelta {
                name: Some("first".to_string()),
                arguments: None,
            }),
        });

        let calls = acc.finalize().unwrap();
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[0].arguments, serde_json::json!({}));
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn accumulator_rejects_desynchronized_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.apply(ToolCallDelta {
            index: 0,
            id: Some("call_x".to_string()),
            function: Some(FunctionDelta {
                name: Some("broken".to_string()),
                arguments: Some("{\"city\": ".to_string()),
            }),
        });
        assert!(matches!(acc.finalize(), Err(ApiError::MalformedChunk(_))));
    }

    #[test]
    fn transcript_maps_to_wire_messages() {
        let platform = Platform::new(ClientType::OpenAi, "gpt-4o")
            .with_system_prompt("Be terse.");
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "get_weather".to_string(),
            arguments: serde_json::json!({"city": "Seoul"}),
        };
        let transcript = vec![
            TranscriptItem::Message(ChatMessage::user("What's the weather?")),
            TranscriptItem::ToolCalls {
                assistant_text: String::new(),
                calls: vec![call.clone()],
            },
            TranscriptItem::ToolResults(vec![ToolResult::success(&call, "22C")]),
        ];

        let messages = OpenAiClient::build_messages(&platform, &transcript);
        let json = serde_json::to_value(&messages).unwrap();

        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[2]["role"], "assistant");
        assert_eq!(json[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(json[2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            json[2]["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Seoul\"}"
        );
        assert!(json[2].get("content").is_none(), "empty assistant text is omitted");
        assert_eq!(json[3]["role"], "tool");
        assert_eq!(json[3]["tool_call_id"], "call_1");
        assert_eq!(json[3]["content"], "22C");
    }

    #[test]
    fn request_omits_tools_when_empty() {
        let platform = Platform::new(ClientType::OpenAi, "gpt-4o");
        let transcript = vec![TranscriptItem::Message(ChatMessage::user("hi"))];

        let request = OpenAiClient::build_request(&platform, &transcript, &[]);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["stream"], true);

        let tool = Tool::new("t", "d", serde_json::json!({"type": "object"}));
        let request = OpenAiClient::build_request(&platform, &transcript, &[tool]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
    }

    #[test]
    fn image_attachments_become_data_urls() {
        let platform = Platform::new(ClientType::OpenAi, "gpt-4o");
        let transcript = vec![TranscriptItem::Message(
            ChatMessage::user("what is this?").with_image("image/png", "aGVsbG8="),
        )];

        let messages = OpenAiClient::build_messages(&platform, &transcript);
        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json[0]["content"][0]["type"], "text");
        assert_eq!(json[0]["content"][1]["type"], "image_url");
        assert_eq!(
            json[0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,aGVsbG8="
        );
    }

    #[test]
    fn responses_input_round_trips_tool_results() {
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "get_weather".to_string(),
            arguments: serde_json::json!({"city": "Seoul"}),
        };
        let transcript = vec![
            TranscriptItem::Message(ChatMessage::user("weather?")),
            TranscriptItem::ToolCalls { assistant_text: "checking".to_string(), calls: vec![call.clone()] },
            TranscriptItem::ToolResults(vec![ToolResult::success(&call, "22C")]),
        ];

        let input = OpenAiClient::build_responses_input(&transcript);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[1]["role"], "assistant");
        assert_eq!(json[2]["type"], "function_call");
        assert_eq!(json[2]["call_id"], "call_9");
        assert_eq!(json[3]["type"], "function_call_output");
        assert_eq!(json[3]["output"], "22C");
    }

    #[test]
    fn responses_event_parses_by_type_tag() {
        let delta: ResponsesStreamEvent = serde_json::from_str(
            "{\"type\":\"response.output_text.delta\",\"item_id\":\"i1\",\"delta\":\"Hel\"}",
        )
        .unwrap();
        assert!(matches!(delta, ResponsesStreamEvent::OutputTextDelta { delta } if delta == "Hel"));

        let unknown: ResponsesStreamEvent =
            serde_json::from_str("{\"type\":\"response.created\"}").unwrap();
        assert!(matches!(unknown, ResponsesStreamEvent::Unknown));
    }
}
