//! Provider client construction.

use std::sync::Arc;

use braid_abstraction::{ClientType, Platform, ProviderClient};

use crate::anthropic::AnthropicClient;
use crate::google::GoogleClient;
use crate::openai::OpenAiClient;

/// Builds the streaming client matching a platform's provider.
#[must_use]
pub fn client_for(platform: &Platform) -> Arc<dyn ProviderClient> {
    client_with(platform.client_type, reqwest::Client::new())
}

/// Same as [`client_for`], sharing an existing HTTP connection pool.
///
/// The OpenAI-compatible family all route to the chat/completions client;
/// only the client type they report differs.
#[must_use]
pub fn client_with(client_type: ClientType, client: reqwest::Client) -> Arc<dyn ProviderClient> {
    match client_type {
        ClientType::Anthropic => Arc::new(AnthropicClient::with_client(client)),
        ClientType::Google => Arc::new(GoogleClient::with_client(client)),
        ClientType::OpenAi
        | ClientType::Groq
        | ClientType::Ollama
        | ClientType::OpenRouter
        | ClientType::Custom => Arc::new(OpenAiClient::with_client(client_type, client)),
    }
}
