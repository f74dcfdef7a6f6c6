// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlite_mcp_protocol::{CallToolResult, ToolDescriptor};
use sqlite_mcp_query::list_tables;

use super::{Tool, ToolCallError};
use crate::db::SqliteExecutor;

pub struct ListTablesTool {
    db: SqliteExecutor,
}

impl ListTablesTool {
    #[must_use]
    pub fn new(db: SqliteExecutor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListTablesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "list_tables",
            "Lists all tables in the SQLite database. Returns a JSON string of the table names.",
            json!({
                "type": "object",
                "properties": {}
            }),
        )
    }

    async fn call(&self, _arguments: &Value) -> Result<CallToolResult, ToolCallError> {
        match self.db.run(list_tables).await {
            Ok(names) => match serde_json::to_string(&names) {
                Ok(payload) => Ok(CallToolResult::text(payload)),
                Err(err) => Ok(CallToolResult::error(format!(
                    "Error listing tables: {err}"
                ))),
            },
            Err(err) => Ok(CallToolResult::error(format!(
                "Error listing tables: {err}"
            ))),
        }
    }
}
