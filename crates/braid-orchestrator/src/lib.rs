//! Chat orchestration for Braid.
//!
//! This crate drives the tool-calling loop on top of the provider
//! abstraction: the `ChatEngine` runs one streaming turn per platform, the
//! `ToolManager` dispatches model-requested tool calls to built-in tools or
//! MCP servers, and the `MessageStore` boundary persists conversations.

pub mod engine;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod store;
pub mod tools;

pub use engine::{ChatEngine, FinishReason, TurnOutcome};
pub use manager::{BuiltInTool, ToolManager, ToolParameters, MAX_TOOL_OUTPUT_CHARS};
pub use mcp::{McpClient, McpContent, McpRegistry, McpToolReply};
pub use store::{
    history_for_platform, ChatRoom, MemoryStore, Message, MessageStore,
};
pub use tools::{WebFetchTool, WebSearchTool};

// Re-export the error pair separately so call sites can use the crate-wide
// `Result` alias directly.
pub use error::{EngineError, Result};
