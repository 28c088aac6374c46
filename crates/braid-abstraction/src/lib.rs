//! Provider abstraction layer for Braid.
//!
//! This module defines the unified types shared by every chat provider: the
//! `ApiState` event stream, the tool model, per-platform configuration, and
//! the `ProviderClient` trait implemented by each streaming client.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cap on tool-call loop iterations within a single turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 20;

/// Represents an error that can occur while driving a chat turn.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    /// The connection could not be established or dropped mid-stream.
    #[error("Network Error: {0}")]
    Network(String),

    /// The provider returned a non-2xx response or an in-band error event.
    #[error("Provider Error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Provider {
        /// HTTP status code, when the error carried one.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Error message from the provider.
        message: String,
    },

    /// A single SSE frame could not be parsed. Recoverable: the frame is
    /// skipped and streaming continues.
    #[error("Malformed Chunk: {0}")]
    MalformedChunk(String),

    /// A built-in or MCP tool failed. Always converted into an error-flagged
    /// `ToolResult`, never terminates the turn.
    #[error("Tool Execution Error: {0}")]
    ToolExecution(String),

    /// The tool-call loop hit its iteration cap. Graceful truncation.
    #[error("Tool call iteration limit ({0}) exceeded")]
    IterationLimitExceeded(u32),

    /// The turn was cancelled by the caller.
    #[error("Turn cancelled")]
    Cancelled,

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    Serialization(String),
}

/// The kind of provider endpoint a platform talks to.
///
/// OpenAI, Groq, Ollama, OpenRouter, and Custom all speak the OpenAI
/// chat/completions wire protocol and share one client implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    OpenAi,
    Anthropic,
    Google,
    Groq,
    Ollama,
    OpenRouter,
    /// Any third-party OpenAI-compatible endpoint.
    Custom,
}

impl ClientType {
    /// Whether this provider speaks the OpenAI chat/completions protocol.
    #[must_use]
    pub const fn is_openai_compatible(self) -> bool {
        matches!(
            self,
            Self::OpenAi | Self::Groq | Self::Ollama | Self::OpenRouter | Self::Custom
        )
    }

    /// The provider's default API base URL.
    #[must_use]
    pub const fn default_api_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/",
            Self::Anthropic => "https://api.anthropic.com/",
            Self::Google => "https://generativelanguage.googleapis.com",
            Self::Groq => "https://api.groq.com/openai/v1/",
            Self::Ollama => "http://localhost:11434/v1/",
            Self::OpenRouter => "https://openrouter.ai/api/v1/",
            Self::Custom => "",
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
            Self::Custom => "custom",
        };
        write!(f, "{name}")
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// An inline image attachment carried alongside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// MIME type, e.g. "image/png".
    pub mime_type: String,
    /// Base64-encoded image bytes (no data-URL prefix).
    pub base64_data: String,
}

/// Represents a message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,
    /// The text content of the message.
    pub content: String,
    /// Inline image attachments, forwarded to providers that accept them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
}

impl ChatMessage {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), images: Vec::new() }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), images: Vec::new() }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), images: Vec::new() }
    }

    /// Attaches an inline image.
    #[must_use]
    pub fn with_image(mut self, mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        self.images.push(ImageData { mime_type: mime_type.into(), base64_data: base64_data.into() });
        self
    }
}

/// Per-platform configuration, snapshotted at turn start.
///
/// Changing settings mid-turn never affects an in-flight turn: the engine and
/// the provider clients only ever see the snapshot they were handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    /// Which wire protocol this platform speaks.
    pub client_type: ClientType,
    /// Whether this platform participates in fan-out.
    pub enabled: bool,
    /// API base URL.
    pub api_url: String,
    /// API token; `None` for unauthenticated endpoints (e.g. local Ollama).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Model identifier to request.
    pub model: String,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// System prompt prepended to every turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Use the OpenAI Responses API instead of chat/completions.
    /// Only meaningful for the OpenAI-compatible family.
    #[serde(default)]
    pub responses_api: bool,
    /// Cap on tool-call loop iterations within one turn.
    pub max_tool_iterations: u32,
}

impl Platform {
    /// Creates a platform snapshot with the provider's default base URL.
    #[must_use]
    pub fn new(client_type: ClientType, model: impl Into<String>) -> Self {
        Self {
            client_type,
            enabled: true,
            api_url: client_type.default_api_url().to_string(),
            token: None,
            model: model.into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            system_prompt: None,
            responses_api: false,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    /// Sets the API token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the nucleus sampling mass.
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the maximum output tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Routes OpenAI requests through the Responses API.
    #[must_use]
    pub const fn with_responses_api(mut self, responses_api: bool) -> Self {
        self.responses_api = responses_api;
        self
    }

    /// Overrides the tool-call iteration cap.
    #[must_use]
    pub const fn with_max_tool_iterations(mut self, max_tool_iterations: u32) -> Self {
        self.max_tool_iterations = max_tool_iterations;
        self
    }
}

/// A tool definition offered to the model.
///
/// Unique by name within a single turn's tool set; defined by built-in
/// implementations or discovered from MCP servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, matched exactly when the model calls it.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-schema object describing the arguments.
    pub parameters: serde_json::Value,
}

impl Tool {
    /// Creates a tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters }
    }
}

/// A completed tool invocation emitted by a provider stream.
///
/// Immutable once constructed; `arguments` is the fully parsed JSON object
/// (fragment accumulation happens inside the provider client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id (synthesized for Gemini, which sends none).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// The outcome of executing one `ToolCall`.
///
/// `call_id` always equals the originating call's `id`; providers reject
/// mismatched correlation on the next request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the originating `ToolCall`.
    pub call_id: String,
    /// Name of the tool that ran.
    pub name: String,
    /// Output fed back to the model (typically JSON text).
    pub output: String,
    /// Whether the execution failed. Error results still round-trip to the
    /// model so it can react.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful result correlated to `call`.
    #[must_use]
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Creates an error-flagged result correlated to `call`.
    ///
    /// The message is wrapped in an `{"error": …}` payload so the model
    /// receives structured feedback rather than a bare string.
    #[must_use]
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        let payload = serde_json::json!({ "error": message.into() });
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: payload.to_string(),
            is_error: true,
        }
    }
}

/// One unit of unified progress within a chat turn.
///
/// Ordering matters: `Loading` first, `Done` last, `Error` terminal. The
/// engine frames the turn with `Loading`/`Done`; provider streams emit the
/// content units in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiState {
    /// The turn has started; no provider data yet.
    Loading,

    /// A reasoning/thinking text delta.
    Thinking { text: String },

    /// An assistant text delta.
    Success { text: String },

    /// The provider finished a response that requests tool calls.
    ToolCallRequested { calls: Vec<ToolCall> },

    /// A tool call is being executed.
    ToolExecuting { name: String, call_id: String },

    /// All pending tool calls finished; results are about to round-trip.
    ToolResultReceived { results: Vec<ToolResult> },

    /// Terminal failure for this platform's turn.
    Error { message: String },

    /// The turn completed.
    Done,
}

/// One item of a turn's transcript, in provider-agnostic form.
///
/// Provider clients map the transcript into their native role/content model
/// at request-build time, preserving tool call/result ordering and
/// correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranscriptItem {
    /// A plain user/assistant/system message.
    Message(ChatMessage),
    /// An assistant response that requested tool calls, with any text that
    /// preceded the calls.
    ToolCalls {
        assistant_text: String,
        calls: Vec<ToolCall>,
    },
    /// Results for the immediately preceding `ToolCalls` item.
    ToolResults(Vec<ToolResult>),
}

/// A lazy, single-pass, in-order stream of unified events.
pub type ApiStateStream = Pin<Box<dyn Stream<Item = ApiState> + Send>>;

/// A streaming chat client for one provider family.
///
/// All clients must be `Send + Sync` to allow concurrent turns across
/// platforms sharing one client instance.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The wire protocol family this client speaks.
    fn client_type(&self) -> ClientType;

    /// Opens a streaming request and returns the unified event sequence.
    ///
    /// The stream emits `Success`/`Thinking` deltas as they arrive, at most
    /// one `ToolCallRequested` carrying every completed call, and then ends.
    /// Failures (connection errors, non-2xx responses, in-band provider
    /// errors) surface as a single terminal `Error` item; this method never
    /// fails past its streaming contract. Malformed individual frames are
    /// skipped unless skipping would desynchronize tool-call accumulation.
    async fn stream_chat(
        &self,
        platform: &Platform,
        transcript: &[TranscriptItem],
        tools: &[Tool],
    ) -> ApiStateStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall { id: id.to_string(), name: name.to_string(), arguments: serde_json::json!({}) }
    }

    #[test]
    fn openai_compatible_family() {
        for ct in [
            ClientType::OpenAi,
            ClientType::Groq,
            ClientType::Ollama,
            ClientType::OpenRouter,
            ClientType::Custom,
        ] {
            assert!(ct.is_openai_compatible(), "{ct} should be OpenAI-compatible");
        }
        assert!(!ClientType::Anthropic.is_openai_compatible());
        assert!(!ClientType::Google.is_openai_compatible());
    }

    #[test]
    fn tool_result_correlates_to_call() {
        let call = call("call_42", "get_weather");
        let ok = ToolResult::success(&call, "22C");
        assert_eq!(ok.call_id, "call_42");
        assert_eq!(ok.name, "get_weather");
        assert!(!ok.is_error);

        let err = ToolResult::error(&call, "city not found");
        assert_eq!(err.call_id, "call_42");
        assert_eq!(err.name, "get_weather");
        assert!(err.is_error);
        let payload: serde_json::Value = serde_json::from_str(&err.output).unwrap();
        assert_eq!(payload["error"], "city not found");
    }

    #[test]
    fn api_state_serializes_tagged() {
        let state = ApiState::Success { text: "Hel".to_string() };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["text"], "Hel");

        let done = serde_json::to_value(ApiState::Done).unwrap();
        assert_eq!(done["type"], "done");
    }

    #[test]
    fn provider_error_display_includes_status() {
        let err = ApiError::Provider { status: Some(429), message: "rate limited".to_string() };
        assert_eq!(err.to_string(), "Provider Error (HTTP 429): rate limited");

        let bare = ApiError::Provider { status: None, message: "bad request".to_string() };
        assert_eq!(bare.to_string(), "Provider Error: bad request");
    }

    #[test]
    fn platform_defaults() {
        let p = Platform::new(ClientType::OpenAi, "gpt-4o");
        assert!(p.enabled);
        assert_eq!(p.api_url, "https://api.openai.com/v1/");
        assert_eq!(p.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
        assert!(!p.responses_api);
    }
}
