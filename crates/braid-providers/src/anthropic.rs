//! Anthropic Messages API streaming client.
//!
//! Parses the typed SSE event protocol (`message_start`, `content_block_*`,
//! `message_stop`) into unified stream units. Tool-use input arrives as
//! `input_json_delta` fragments per content block; fragments are buffered by
//! block index and parsed when the block stops.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use braid_abstraction::{
    ApiState, ApiStateStream, ChatRole, ClientType, Platform, ProviderClient, Tool, ToolCall,
    TranscriptItem,
};

use crate::convert::{convert_tools_for_provider, ProviderTools};
use crate::error_stream;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Streaming client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Creates a client sharing an existing HTTP connection pool.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint(base_url: &str) -> String {
        format!("{}/v1/messages", base_url.trim_end_matches('/'))
    }

    /// Maps the unified transcript into Messages API wire shapes.
    ///
    /// System text has no message role here; the platform system prompt and
    /// any system transcript entries are folded into the `system` field.
    fn build_request(
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> MessagesRequest {
        let mut system_parts: Vec<String> = Vec::new();
        if let Some(prompt) = &platform.system_prompt {
            if !prompt.is_empty() {
                system_parts.push(prompt.clone());
            }
        }

        let mut messages = Vec::new();
        for item in transcript {
            match item {
                TranscriptItem::Message(msg) => {
                    if msg.role == ChatRole::System {
                        system_parts.push(msg.content.clone());
                        continue;
                    }
                    let role = match msg.role {
                        ChatRole::User => "user",
                        _ => "assistant",
                    };
                    let mut content = vec![ContentBlock::Text { text: msg.content.clone() }];
                    content.extend(msg.images.iter().map(|img| ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: img.mime_type.clone(),
                            data: img.base64_data.clone(),
                        },
                    }));
                    messages.push(WireMessage { role, content });
                }
                TranscriptItem::ToolCalls { assistant_text, calls } => {
                    let mut content = Vec::new();
                    if !assistant_text.is_empty() {
                        content.push(ContentBlock::Text { text: assistant_text.clone() });
                    }
                    content.extend(calls.iter().map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }));
                    messages.push(WireMessage { role: "assistant", content });
                }
                TranscriptItem::ToolResults(results) => {
                    // Results return to the model as user-role blocks.
                    let content = results
                        .iter()
                        .map(|result| ContentBlock::ToolResult {
                            tool_use_id: result.call_id.clone(),
                            content: result.output.clone(),
                            is_error: result.is_error,
                        })
                        .collect();
                    messages.push(WireMessage { role: "user", content });
                }
            }
        }

        let provider_tools = convert_tools_for_provider(tools, ClientType::Anthropic);
        MessagesRequest {
            model: platform.model.clone(),
            max_tokens: platform.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            stream: true,
            system: if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) },
            temperature: platform.temperature,
            top_p: platform.top_p,
            tools: if provider_tools.is_empty() { None } else { Some(provider_tools) },
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn client_type(&self) -> ClientType {
        ClientType::Anthropic
    }

    async fn stream_chat(
        &self,
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ApiStateStream {
        let request = Self::build_request(platform, transcript, tools);
        let url = Self::endpoint(&platform.api_url);
        debug!(
            model = %platform.model,
            message_count = request.messages.len(),
            tool_count = tools.len(),
            "opening messages stream"
        );

        let mut http_request = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        if let Some(token) = platform.token.as_deref() {
            http_request = http_request.header("x-api-key", token);
        }

        let response = match http_request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, url = %url, "failed to open stream");
                return error_stream(format!("Network error: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorEnvelope>(&body).map_or_else(
                |_| format!("HTTP {}: {}", status.as_u16(), body),
                |e| e.error.message,
            );
            error!(status = %status, error = %message, "provider returned error status");
            return error_stream(message);
        }

        Box::pin(MessagesEventStream::new(response))
    }
}

/// SSE parser for the Messages event protocol.
struct MessagesEventStream {
    stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    /// Open `tool_use` blocks, keyed by content block index.
    pending: HashMap<usize, PendingToolUse>,
    /// Blocks already stopped, in arrival order.
    completed: Vec<ToolCall>,
    done: bool,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

impl MessagesEventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            pending: HashMap::new(),
            completed: Vec::new(),
            done: false,
        }
    }

    fn close_block(&mut self, index: usize) -> Option<ApiState> {
        let block = self.pending.remove(&index)?;
        let input = if block.json.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&block.json) {
                Ok(value) => value,
                Err(e) => {
                    self.done = true;
                    return Some(ApiState::Error {
                        message: format!("tool input for block {} did not parse: {}", index, e),
                    });
                }
            }
        };
        self.completed.push(ToolCall { id: block.id, name: block.name, arguments: input });
        None
    }

    /// Terminates the stream, closing any still-open blocks first.
    fn finish(&mut self) -> Option<ApiState> {
        self.done = true;
        let mut open: Vec<usize> = self.pending.keys().copied().collect();
        open.sort_unstable();
        for index in open {
            if let Some(state) = self.close_block(index) {
                return Some(state);
            }
        }
        if self.completed.is_empty() {
            return None;
        }
        Some(ApiState::ToolCallRequested { calls: std::mem::take(&mut self.completed) })
    }

    fn handle_event(&mut self, event: &str) -> Option<ApiState> {
        // Every data payload carries its own type field, so the preceding
        // `event:` line is redundant and dispatch happens on the payload.
        let data = event.lines().find_map(|line| line.strip_prefix("data: "))?;

        match serde_json::from_str::<MessagesEvent>(data) {
            Ok(MessagesEvent::ContentBlockStart { index, content_block }) => {
                if content_block.block_type == "tool_use" {
                    self.pending.insert(
                        index,
                        PendingToolUse {
                            id: content_block
                                .id
                                .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4())),
                            name: content_block.name.unwrap_or_default(),
                            json: String::new(),
                        },
                    );
                }
                None
            }
            Ok(MessagesEvent::ContentBlockDelta { index, delta }) => match delta {
                BlockDelta::TextDelta { text } => {
                    if text.is_empty() {
                        None
                    } else {
                        Some(ApiState::Success { text })
                    }
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    if thinking.is_empty() {
                        None
                    } else {
                        Some(ApiState::Thinking { text: thinking })
                    }
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(block) = self.pending.get_mut(&index) {
                        block.json.push_str(&partial_json);
                        None
                    } else {
                        // A fragment with no open block means accumulation
                        // has desynchronized; the stream cannot be trusted.
                        self.done = true;
                        Some(ApiState::Error {
                            message: format!("input fragment for unknown tool block {}", index),
                        })
                    }
                }
                BlockDelta::Unknown => None,
            },
            Ok(MessagesEvent::ContentBlockStop { index }) => self.close_block(index),
            Ok(MessagesEvent::MessageDelta { delta }) => {
                if let Some(reason) = delta.stop_reason {
                    debug!(stop_reason = %reason, "message finished");
                }
                None
            }
            Ok(MessagesEvent::MessageStop) => self.finish(),
            Ok(MessagesEvent::Error { error }) => {
                self.done = true;
                Some(ApiState::Error { message: error.message })
            }
            Ok(MessagesEvent::MessageStart | MessagesEvent::Ping | MessagesEvent::Unknown) => None,
            Err(e) => {
                debug!(error = %e, "skipping malformed messages event");
                None
            }
        }
    }
}

impl Stream for MessagesEventStream {
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
                    // Connection closed without message_stop; drain and flush.
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

// Wire format: request

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<ProviderTools>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

// Wire format: streaming events

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesEvent {
    MessageStart,
    ContentBlockStart { index: usize, content_block: ContentBlockHeader },
    ContentBlockDelta { index: usize, delta: BlockDelta },
    ContentBlockStop { index: usize },
    MessageDelta { delta: MessageDeltaBody },
    MessageStop,
    Ping,
    Error { error: WireErrorBody },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ContentBlockHeader {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}
