// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::Value;
use sqlite_mcp_protocol::{CallToolResult, ToolDescriptor};
use sqlite_mcp_query::QueryLimits;
use std::sync::Arc;

use crate::db::SqliteExecutor;

mod execute_query;
mod list_tables;

pub use execute_query::{ExecuteQueryTool, QUERY_REJECTION_TEXT};
pub use list_tables::ListTablesTool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    UnknownTool(String),
    InvalidArguments(String),
}

impl std::fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
        }
    }
}
impl std::error::Error for ToolCallError {}

/// One MCP tool. Failures a client should see stay inside the returned
/// [`CallToolResult`] as error text; [`ToolCallError`] is reserved for
/// requests that never reach the tool (bad name, bad argument shape).
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn descriptor(&self) -> ToolDescriptor;
    async fn call(&self, arguments: &Value) -> Result<CallToolResult, ToolCallError>;
}

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The standard tool set of this server.
    #[must_use]
    pub fn standard(db: SqliteExecutor, limits: QueryLimits) -> Self {
        Self {
            tools: vec![
                Arc::new(ExecuteQueryTool::new(db.clone(), limits)),
                Arc::new(ListTablesTool::new(db)),
            ],
        }
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub async fn call(&self, name: &str, arguments: &Value) -> Result<CallToolResult, ToolCallError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;
        tool.call(arguments).await
    }
}
