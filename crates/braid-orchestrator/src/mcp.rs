//! MCP (Model Context Protocol) tool integration.
//!
//! The registry tracks which server owns each advertised tool name. The
//! transport lives behind the `McpClient` trait so the engine has no
//! dependency on any particular MCP transport; the application level
//! supplies connected clients.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use braid_abstraction::Tool;

use crate::error::{EngineError, Result};

/// Content blocks an MCP tool may return.
#[derive(Debug, Clone)]
pub enum McpContent {
    /// Text content
    Text { text: String },
    /// Image content; only a placeholder reaches the model
    Image { data: String, mime_type: String },
    /// Audio content; only a placeholder reaches the model
    Audio { data: String, mime_type: String },
    /// Resource reference
    Resource { uri: String },
}

/// Reply from one MCP tool invocation.
///
/// `is_error` is the protocol's in-band failure flag: the content still
/// reaches the model, flagged as an error result.
#[derive(Debug, Clone)]
pub struct McpToolReply {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

impl McpToolReply {
    /// Creates a successful reply.
    #[must_use]
    pub fn success(content: Vec<McpContent>) -> Self {
        Self { content, is_error: false }
    }

    /// Creates an error-flagged reply.
    #[must_use]
    pub fn error(content: Vec<McpContent>) -> Self {
        Self { content, is_error: true }
    }

    /// Shorthand for a plain-text success reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![McpContent::Text { text: text.into() }])
    }
}

/// A connection to one MCP server.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Server name used in logs and diagnostics.
    fn server_name(&self) -> &str;

    /// Lists the tools this server offers.
    async fn list_tools(&self) -> Result<Vec<Tool>>;

    /// Invokes one tool by name.
    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<McpToolReply>;
}

struct RegisteredServer {
    client: Arc<dyn McpClient>,
    allowed: Option<Vec<String>>,
    tools: Vec<Tool>,
}

#[derive(Default)]
struct RegistryState {
    servers: Vec<RegisteredServer>,
    /// Tool name to index into `servers`. Later registrations win.
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (idx, server) in self.servers.iter().enumerate() {
            for tool in &server.tools {
                if let Some(previous) = self.index.insert(tool.name.clone(), idx) {
                    warn!(
                        tool = %tool.name,
                        previous_server = %self.servers[previous].client.server_name(),
                        new_server = %server.client.server_name(),
                        "MCP tool name served by multiple servers; later registration wins"
                    );
                }
            }
        }
    }
}

/// Read-mostly registry of MCP servers and the tools they serve.
///
/// Tool lists are fetched at registration and on `refresh`; turns only take
/// the read lock, so in-flight tool dispatch never observes a half-rebuilt
/// index.
#[derive(Default)]
pub struct McpRegistry {
    state: RwLock<RegistryState>,
}

impl McpRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server, fetching its tool list once.
    ///
    /// `allowed_tools` filters the advertisement when present, here and on
    /// every later `refresh`. When two servers serve the same tool name, the
    /// later registration takes the name over with a warning.
    ///
    /// Returns the number of tools registered.
    pub async fn register_server(
        &self,
        client: Arc<dyn McpClient>,
        allowed_tools: Option<&[String]>,
    ) -> Result<usize> {
        let server_name = client.server_name().to_string();
        let mut tools =
            client.list_tools().await.map_err(|e| EngineError::McpRegistration {
                server: server_name.clone(),
                reason: e.to_string(),
            })?;
        if let Some(allowed) = allowed_tools {
            tools.retain(|tool| allowed.iter().any(|name| name == &tool.name));
        }

        let mut state = self.state.write().await;
        let server_idx = state.servers.len();
        for tool in &tools {
            if let Some(previous) = state.index.insert(tool.name.clone(), server_idx) {
                warn!(
                    tool = %tool.name,
                    previous_server = %state.servers[previous].client.server_name(),
                    new_server = %server_name,
                    "MCP tool name served by multiple servers; later registration wins"
                );
            }
        }
        let count = tools.len();
        debug!(server = %server_name, tool_count = count, "registered MCP server");
        state.servers.push(RegisteredServer {
            client,
            allowed: allowed_tools.map(<[String]>::to_vec),
            tools,
        });
        Ok(count)
    }

    /// Re-lists tools from every registered server and rebuilds the index.
    ///
    /// A server that fails to list keeps its previous tool set.
    pub async fn refresh(&self) {
        let clients: Vec<(usize, Arc<dyn McpClient>, Option<Vec<String>>)> = {
            let state = self.state.read().await;
            state
                .servers
                .iter()
                .enumerate()
                .map(|(idx, server)| (idx, Arc::clone(&server.client), server.allowed.clone()))
                .collect()
        };

        let mut fresh = Vec::new();
        for (idx, client, allowed) in clients {
            match client.list_tools().await {
                Ok(mut tools) => {
                    if let Some(allowed) = &allowed {
                        tools.retain(|tool| allowed.iter().any(|name| name == &tool.name));
                    }
                    fresh.push((idx, tools));
                }
                Err(e) => {
                    warn!(
                        server = %client.server_name(),
                        error = %e,
                        "MCP refresh failed; keeping previous tool list"
                    );
                }
            }
        }

        let mut state = self.state.write().await;
        for (idx, tools) in fresh {
            if let Some(server) = state.servers.get_mut(idx) {
                server.tools = tools;
            }
        }
        state.rebuild_index();
    }

    /// Whether any server serves this tool name.
    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.index.contains_key(name)
    }

    /// Snapshot of every advertised tool definition, in registration order,
    /// with overridden duplicates removed.
    pub async fn tools(&self) -> Vec<Tool> {
        let state = self.state.read().await;
        let mut tools = Vec::new();
        for (idx, server) in state.servers.iter().enumerate() {
            for tool in &server.tools {
                if state.index.get(&tool.name) == Some(&idx) {
                    tools.push(tool.clone());
                }
            }
        }
        tools
    }

    /// Calls a tool on whichever server owns the name, rendering the reply
    /// content to text. An error-flagged reply comes back as `Err` carrying
    /// the rendered content.
    pub async fn call(&self, name: &str, arguments: &Value) -> Result<String> {
        let client = {
            let state = self.state.read().await;
            let idx = *state
                .index
                .get(name)
                .ok_or_else(|| EngineError::Other(format!("MCP tool '{}' not registered", name)))?;
            Arc::clone(&state.servers[idx].client)
        };

        // Lock released before the network round trip.
        let reply = client.call_tool(name, arguments).await?;
        let rendered = render_content(&reply.content);
        if reply.is_error {
            return Err(EngineError::ToolFailed(rendered));
        }
        Ok(rendered)
    }
}

/// Renders MCP content blocks into one text payload for the model.
///
/// Non-text blocks become placeholders; tool results have no rich-content
/// round trip in the transcript.
fn render_content(content: &[McpContent]) -> String {
    if content.is_empty() {
        return "Tool executed successfully".to_string();
    }
    content
        .iter()
        .map(|block| match block {
            McpContent::Text { text } => text.clone(),
            McpContent::Image { mime_type, .. } => format!("[Image content: {}]", mime_type),
            McpContent::Audio { mime_type, .. } => format!("[Audio content: {}]", mime_type),
            McpContent::Resource { uri } => format!("[Resource: {}]", uri),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
