//! Provider stream clients for Braid.
//!
//! This crate provides concrete implementations of the `ProviderClient` trait.
//!
//! # Supported Providers
//!
//! - **OpenAI-compatible**: OpenAI chat/completions and Responses API; also
//!   Groq, Ollama, OpenRouter, and custom endpoints speaking the same protocol
//! - **Anthropic**: Messages API over SSE
//! - **Google**: Gemini streamGenerateContent over SSE
//!
//! Each client owns one HTTP/SSE connection lifecycle per chat turn and
//! translates the vendor's wire events into the unified `ApiState` sequence.

pub mod anthropic;
pub mod convert;
pub mod factory;
pub mod google;
pub mod openai;

use braid_abstraction::{ApiState, ApiStateStream};

pub use anthropic::AnthropicClient;
pub use convert::{
    convert_tools_for_provider, normalize_description, ProviderTools, PARAM_DESCRIPTION_CAP,
    TOOL_DESCRIPTION_CAP,
};
pub use factory::{client_for, client_with};
pub use google::GoogleClient;
pub use openai::OpenAiClient;

/// A single-item stream carrying one terminal error unit.
///
/// Connection-phase failures surface through the streaming contract rather
/// than as a returned error, so every failure path ends in the same place.
pub(crate) fn error_stream(message: String) -> ApiStateStream {
    Box::pin(futures::stream::iter([ApiState::Error { message }]))
}
