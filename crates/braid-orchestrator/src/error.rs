// Error types for the chat engine and its tool plumbing

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid tool arguments
    #[error("Invalid tool arguments for '{tool}': {reason}")]
    InvalidToolArguments {
        /// Tool name
        tool: String,
        /// Reason why arguments are invalid
        reason: String,
    },

    /// Protocol-layer error surfaced by a provider client
    #[error("API error: {0}")]
    Api(#[from] braid_abstraction::ApiError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chat room not found in the store
    #[error("Chat {0} not found")]
    ChatNotFound(i64),

    /// MCP server registration failed
    #[error("MCP server '{server}' registration failed: {reason}")]
    McpRegistration {
        /// Server name
        server: String,
        /// Reason registration failed
        reason: String,
    },

    /// A tool reported failure through its own reply content
    #[error("{0}")]
    ToolFailed(String),

    /// Other error
    #[error("Engine error: {0}")]
    Other(String),
}
