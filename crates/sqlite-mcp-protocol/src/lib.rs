#![forbid(unsafe_code)]

//! Wire types for the sqlite-mcp-server: the JSON-RPC 2.0 envelope and the
//! MCP lifecycle and tool messages carried inside it.

pub mod jsonrpc;
pub mod lifecycle;
pub mod tools;

pub const CRATE_NAME: &str = "sqlite-mcp-protocol";

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION};
pub use lifecycle::{
    negotiate_revision, Implementation, InitializeParams, InitializeResult, ServerCapabilities,
    ToolsCapability, PROTOCOL_REVISION,
};
pub use tools::{CallToolParams, CallToolResult, ListToolsResult, ToolContent, ToolDescriptor};
