//! Google Gemini streaming client.
//!
//! Uses `streamGenerateContent` with `alt=sse`, where every SSE event carries
//! one complete `GenerateContentResponse` JSON object. The wire protocol has
//! no tool-call ids, so ids are synthesized locally and results correlate
//! back by function name and order.

use std::collections::VecDeque;
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

/// Streaming client for the Google Gemini API.
pub struct GoogleClient {
    client: reqwest::Client,
}

impl Default for GoogleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Creates a client sharing an existing HTTP connection pool.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint(base_url: &str, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            base_url.trim_end_matches('/'),
            model
        )
    }

    /// Wraps a tool output for the `functionResponse.response` field, which
    /// must be a JSON object on this wire.
    fn response_payload(output: &str) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(output) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => serde_json::json!({ "result": output }),
        }
    }

    /// Maps the unified transcript into `contents` and `systemInstruction`.
    fn build_request(
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> GenerateContentRequest {
        let mut system_parts: Vec<RequestPart> = Vec::new();
        if let Some(prompt) = &platform.system_prompt {
            if !prompt.is_empty() {
                system_parts.push(RequestPart::Text { text: prompt.clone() });
            }
        }

        let mut contents = Vec::new();
        for item in transcript {
            match item {
                TranscriptItem::Message(msg) => {
                    if msg.role == ChatRole::System {
                        system_parts.push(RequestPart::Text { text: msg.content.clone() });
                        continue;
                    }
                    let role = match msg.role {
                        ChatRole::User => "user",
                        _ => "model",
                    };
                    let mut parts = vec![RequestPart::Text { text: msg.content.clone() }];
                    parts.extend(msg.images.iter().map(|img| RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: img.mime_type.clone(),
                            data: img.base64_data.clone(),
                        },
                    }));
                    contents.push(Content { role, parts });
                }
                TranscriptItem::ToolCalls { assistant_text, calls } => {
                    let mut parts = Vec::new();
                    if !assistant_text.is_empty() {
                        parts.push(RequestPart::Text { text: assistant_text.clone() });
                    }
                    // Ids are local-only; the wire carries name and args.
                    parts.extend(calls.iter().map(|call| RequestPart::FunctionCall {
                        function_call: RequestFunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        },
                    }));
                    contents.push(Content { role: "model", parts });
                }
                TranscriptItem::ToolResults(results) => {
                    let parts = results
                        .iter()
                        .map(|result| RequestPart::FunctionResponse {
                            function_response: FunctionResponse {
                                name: result.name.clone(),
                                response: Self::response_payload(&result.output),
                            },
                        })
                        .collect();
                    contents.push(Content { role: "function", parts });
                }
            }
        }

        let generation_config = if platform.temperature.is_none()
            && platform.top_p.is_none()
            && platform.max_tokens.is_none()
        {
            None
        } else {
            Some(GenerationConfig {
                temperature: platform.temperature,
                top_p: platform.top_p,
                max_output_tokens: platform.max_tokens,
            })
        };

        let provider_tools = convert_tools_for_provider(tools, ClientType::Google);
        GenerateContentRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(SystemInstruction { parts: system_parts })
            },
            generation_config,
            tools: if provider_tools.is_empty() { None } else { Some(provider_tools) },
        }
    }
}

#[async_trait]
impl ProviderClient for GoogleClient {
    fn client_type(&self) -> ClientType {
        ClientType::Google
    }

    async fn stream_chat(
        &self,
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ApiStateStream {
        let request = Self::build_request(platform, transcript, tools);
        let url = Self::endpoint(&platform.api_url, &platform.model);
        debug!(
            model = %platform.model,
            content_count = request.contents.len(),
            tool_count = tools.len(),
            "opening generate content stream"
        );

        let mut http_request = self.client.post(&url).query(&[("alt", "sse")]).json(&request);
        if let Some(token) = platform.token.as_deref() {
            http_request = http_request.query(&[("key", token)]);
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

        Box::pin(GenerateContentStream::new(response))
    }
}

/// SSE parser for `streamGenerateContent` events.
///
/// One event may hold text, function calls, and a finish reason at once, so
/// decoded units queue in `ready` and drain one per poll.
struct GenerateContentStream {
    stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    staged: Vec<ToolCall>,
    ready: VecDeque<ApiState>,
    done: bool,
}

impl GenerateContentStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            staged: Vec::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn flush_staged(&mut self) {
        if !self.staged.is_empty() {
            self.ready
                .push_back(ApiState::ToolCallRequested { calls: std::mem::take(&mut self.staged) });
        }
    }

    fn handle_event(&mut self, event: &str) {
        let Some(data) = event.lines().find_map(|line| line.strip_prefix("data: ")) else {
            return;
        };

        match serde_json::from_str::<GenerateContentChunk>(data) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    self.ready.push_back(ApiState::Error { message: err.message });
                    self.done = true;
                    return;
                }
                if let Some(reason) =
                    chunk.prompt_feedback.and_then(|feedback| feedback.block_reason)
                {
                    self.ready
                        .push_back(ApiState::Error { message: format!("Content blocked: {}", reason) });
                    self.done = true;
                    return;
                }

                for candidate in chunk.candidates {
                    if let Some(content) = candidate.content {
                        for part in content.parts {
                            if let Some(text) = part.text {
                                if text.is_empty() {
                                    continue;
                                }
                                if part.thought {
                                    self.ready.push_back(ApiState::Thinking { text });
                                } else {
                                    self.ready.push_back(ApiState::Success { text });
                                }
                            } else if let Some(call) = part.function_call {
                                self.staged.push(ToolCall {
                                    id: format!("call_{}", uuid::Uuid::new_v4()),
                                    name: call.name,
                                    arguments: call.args.unwrap_or_else(|| serde_json::json!({})),
                                });
                            }
                        }
                    }
                    if let Some(reason) = candidate.finish_reason {
                        debug!(finish_reason = %reason, "candidate finished");
                        self.flush_staged();
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "skipping malformed generate content chunk");
            }
        }
    }
}

impl Stream for GenerateContentStream {
    type Item = ApiState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(state) = self.ready.pop_front() {
                return Poll::Ready(Some(state));
            }
            if self.done {
                return Poll::Ready(None);
            }

            while let Some(end_idx) = self.buffer.find("\n\n") {
                let event = self.buffer[..end_idx].to_string();
                self.buffer = self.buffer[end_idx + 2..].to_string();
                self.handle_event(&event);

                if let Some(state) = self.ready.pop_front() {
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
                        self.ready.push_back(ApiState::Error {
                            message: format!("Failed to decode SSE chunk: {}", e),
                        });
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    self.ready
                        .push_back(ApiState::Error { message: format!("Stream error: {}", e) });
                }
                Poll::Ready(None) => {
                    // Stream closed; drain any final event and flush calls.
                    if !self.buffer.trim().is_empty() {
                        let event = std::mem::take(&mut self.buffer);
                        self.handle_event(event.trim_end());
                    }
                    self.flush_staged();
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// Wire format: request

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<ProviderTools>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: RequestFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct RequestFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Wire format: streaming chunks

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<WireErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<ResponseFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}
