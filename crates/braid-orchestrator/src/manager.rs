//! Tool dispatch for the chat engine.
//!
//! The manager owns the built-in tools and an MCP registry, advertises their
//! combined definitions to providers, and routes calls to whichever side owns
//! the name. Built-ins win name collisions. Execution is total: every
//! failure becomes an error-flagged result that rounds back to the model,
//! never a turn-ending error.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use braid_abstraction::{Tool, ToolCall, ToolResult};

use crate::error::Result;
use crate::mcp::McpRegistry;
use crate::tools::{WebFetchTool, WebSearchTool};

/// Character cap applied to every tool output before it rounds back to the
/// model. Keeps one oversized page or MCP payload from flooding the context.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 12_000;

/// Marker appended when an output is cut at the cap.
const TRUNCATION_MARKER: &str = "\n[truncated]";

/// A tool implemented inside this crate, as opposed to one served over MCP.
#[async_trait]
pub trait BuiltInTool: Send + Sync {
    /// Stable tool name advertised to providers.
    fn name(&self) -> &'static str;

    /// Schema definition advertised to providers.
    fn definition(&self) -> Tool;

    /// Runs the tool. Argument validation failures are errors here; the
    /// manager converts every error into an error-flagged result.
    async fn execute(&self, arguments: &Value) -> Result<String>;
}

/// JSON-schema builder for tool parameter definitions.
#[derive(Debug, Clone, Default)]
pub struct ToolParameters {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolParameters {
    /// Create a new, empty parameter schema
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        property_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({
                "type": property_type.into(),
                "description": description.into(),
            }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Render the schema as a JSON object definition
    #[must_use]
    pub fn build(self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Routes tool calls to built-ins or MCP servers.
#[derive(Clone)]
pub struct ToolManager {
    built_ins: Vec<Arc<dyn BuiltInTool>>,
    mcp: Arc<McpRegistry>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolManager {
    /// Creates an empty manager with no tools registered.
    #[must_use]
    pub fn new() -> Self {
        Self { built_ins: Vec::new(), mcp: Arc::new(McpRegistry::new()) }
    }

    /// Registers the stock web tools (`web_search`, `web_fetch`).
    #[must_use]
    pub fn with_web_tools(self) -> Self {
        self.with_built_in(Arc::new(WebSearchTool::new()))
            .with_built_in(Arc::new(WebFetchTool::new()))
    }

    /// Registers one built-in tool.
    #[must_use]
    pub fn with_built_in(mut self, tool: Arc<dyn BuiltInTool>) -> Self {
        self.built_ins.push(tool);
        self
    }

    /// Attaches an MCP registry.
    #[must_use]
    pub fn with_mcp(mut self, mcp: Arc<McpRegistry>) -> Self {
        self.mcp = mcp;
        self
    }

    /// All tool definitions to advertise to a provider: built-ins first,
    /// then MCP tools. An MCP tool whose name collides with a built-in is
    /// dropped from the advertisement so the name routes unambiguously.
    pub async fn available_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.built_ins.iter().map(|t| t.definition()).collect();
        let built_in_names: HashSet<&str> = self.built_ins.iter().map(|t| t.name()).collect();

        for tool in self.mcp.tools().await {
            if built_in_names.contains(tool.name.as_str()) {
                warn!(tool = %tool.name, "MCP tool shadowed by a built-in with the same name");
                continue;
            }
            tools.push(tool);
        }
        tools
    }

    /// Executes one call. Never fails: unknown names and tool errors come
    /// back as error-flagged results for the model to react to.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        if let Some(tool) = self.built_ins.iter().find(|t| t.name() == call.name) {
            debug!(tool = %call.name, call_id = %call.id, "executing built-in tool");
            return match tool.execute(&call.arguments).await {
                Ok(output) => ToolResult::success(call, truncate_output(output)),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "built-in tool failed");
                    ToolResult::error(call, &e.to_string())
                }
            };
        }

        if self.mcp.contains(&call.name).await {
            debug!(tool = %call.name, call_id = %call.id, "executing MCP tool");
            return match self.mcp.call(&call.name, &call.arguments).await {
                Ok(output) => ToolResult::success(call, truncate_output(output)),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "MCP tool failed");
                    ToolResult::error(call, &e.to_string())
                }
            };
        }

        let available: Vec<String> =
            self.available_tools().await.into_iter().map(|t| t.name).collect();
        ToolResult::error(
            call,
            &format!(
                "Tool '{}' not found. Available tools ({}): {}",
                call.name,
                available.len(),
                available.join(", ")
            ),
        )
    }

    /// Executes a batch of calls concurrently, returning results in call
    /// order regardless of completion order.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.len() <= 1 {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute(call).await);
            }
            return results;
        }

        let mut handles = Vec::with_capacity(calls.len());
        for call in calls {
            let manager = self.clone();
            let call = call.clone();
            handles.push(tokio::spawn(async move { manager.execute(&call).await }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, call) in handles.into_iter().zip(calls) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool task join failed");
                    results.push(ToolResult::error(call, &format!("tool task failed: {}", e)));
                }
            }
        }
        results
    }
}

fn truncate_output(output: String) -> String {
    if output.chars().count() <= MAX_TOOL_OUTPUT_CHARS {
        return output;
    }
    let mut truncated: String = output.chars().take(MAX_TOOL_OUTPUT_CHARS).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
