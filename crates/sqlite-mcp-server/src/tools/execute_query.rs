// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlite_mcp_protocol::{CallToolResult, ToolDescriptor};
use sqlite_mcp_query::{ensure_read_only, run_select_json, GuardError, QueryLimits};

use super::{Tool, ToolCallError};
use crate::db::SqliteExecutor;

/// Rejection text clients match on; do not reword.
pub const QUERY_REJECTION_TEXT: &str =
    "Error: Only SELECT queries are allowed for security reasons.";

pub struct ExecuteQueryTool {
    db: SqliteExecutor,
    limits: QueryLimits,
}

impl ExecuteQueryTool {
    #[must_use]
    pub fn new(db: SqliteExecutor, limits: QueryLimits) -> Self {
        Self { db, limits }
    }
}

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "execute_query",
            "Executes a read-only SQL query on the database. Only SELECT statements are allowed. \
             Returns a JSON string of the query result.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The SQL SELECT statement to execute."
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, arguments: &Value) -> Result<CallToolResult, ToolCallError> {
        let query = arguments
            .get("query")
            .ok_or_else(|| ToolCallError::InvalidArguments("missing required argument: query".to_string()))?
            .as_str()
            .ok_or_else(|| ToolCallError::InvalidArguments("query must be a string".to_string()))?
            .to_string();

        // A statement that does not lead with SELECT gets the canonical
        // rejection; a stacked statement leads with SELECT, so it reports
        // through the execution-error channel instead.
        match ensure_read_only(&query) {
            Err(GuardError::NotSelect | GuardError::Empty) => {
                return Ok(CallToolResult::error(QUERY_REJECTION_TEXT));
            }
            Err(err @ GuardError::MultipleStatements) => {
                return Ok(CallToolResult::error(format!(
                    "Error executing query: {err}"
                )));
            }
            Ok(()) => {}
        }

        let limits = self.limits.clone();
        match self
            .db
            .run(move |conn| run_select_json(conn, &query, &limits))
            .await
        {
            Ok(payload) => Ok(CallToolResult::text(payload)),
            Err(err) => Ok(CallToolResult::error(format!(
                "Error executing query: {err}"
            ))),
        }
    }
}
