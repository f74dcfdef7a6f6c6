// SPDX-License-Identifier: Apache-2.0

use serde_json::{json, Value};
use sqlite_mcp_protocol::{
    negotiate_revision, Implementation, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ServerCapabilities,
};
use sqlite_mcp_protocol::{CallToolParams, ToolsCapability};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::telemetry::RequestMetrics;
use crate::tools::{ToolCallError, ToolRegistry};

pub const SERVER_NAME: &str = "sqlite-mcp-server";

/// JSON-RPC dispatch for the MCP method surface. Transport-agnostic: both
/// the SSE session plumbing and the stdio loop feed requests through here.
pub struct McpService {
    registry: ToolRegistry,
    server_info: Implementation,
    metrics: Arc<RequestMetrics>,
}

impl McpService {
    #[must_use]
    pub fn new(registry: ToolRegistry, metrics: Arc<RequestMetrics>) -> Self {
        Self {
            registry,
            server_info: Implementation::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
            metrics,
        }
    }

    /// Handle one raw frame. Invalid JSON and invalid envelopes answer with
    /// the null-id error responses JSON-RPC mandates.
    pub async fn handle_raw(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                let error = if serde_json::from_str::<Value>(raw).is_ok() {
                    JsonRpcError::invalid_request(err.to_string())
                } else {
                    JsonRpcError::parse_error(err.to_string())
                };
                Some(JsonRpcResponse::error(RequestId::Null, error))
            }
        }
    }

    /// Like [`handle_raw`], for transports that already hold parsed JSON.
    ///
    /// [`handle_raw`]: Self::handle_raw
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(err) => Some(JsonRpcResponse::error(
                RequestId::Null,
                JsonRpcError::invalid_request(err.to_string()),
            )),
        }
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            match request.method.as_str() {
                "notifications/initialized" => debug!("client initialized"),
                other => debug!(method = other, "ignoring notification"),
            }
            return None;
        }
        let id = match request.id.clone() {
            Some(id) => id,
            None => return None,
        };
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => to_result_value(ListToolsResult {
                tools: self.registry.descriptors(),
            }),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        if let Some(client) = &params.client_info {
            debug!(client = %client.name, version = %client.version, "initialize");
        }
        to_result_value(InitializeResult {
            protocol_version: negotiate_revision(&params.protocol_version).to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: self.server_info.clone(),
            instructions: Some(
                "Query the configured SQLite database with the execute_query and list_tables tools."
                    .to_string(),
            ),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        let started = Instant::now();
        match self.registry.call(&params.name, &params.arguments).await {
            Ok(result) => {
                self.metrics
                    .observe_tool_call(&params.name, started.elapsed(), result.is_error)
                    .await;
                to_result_value(result)
            }
            Err(err @ (ToolCallError::UnknownTool(_) | ToolCallError::InvalidArguments(_))) => {
                self.metrics
                    .observe_tool_call(&params.name, started.elapsed(), true)
                    .await;
                Err(JsonRpcError::invalid_params(err.to_string()))
            }
        }
    }
}

fn to_result_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::db::SqliteExecutor;
    use crate::tools::QUERY_REJECTION_TEXT;
    use rusqlite::Connection;
    use sqlite_mcp_query::QueryLimits;
    use std::path::PathBuf;

    fn fixture_db(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("app.db");
        let conn = Connection::open(&path).expect("open fixture");
        conn.execute_batch(
            "CREATE TABLE properties(id INTEGER PRIMARY KEY, city TEXT, price REAL);
             INSERT INTO properties(id, city, price) VALUES (1, 'Lisbon', 450000.0);
             INSERT INTO properties(id, city, price) VALUES (2, 'Porto', 280000.5);",
        )
        .expect("seed fixture");
        path
    }

    fn service_for(path: PathBuf) -> McpService {
        let db = SqliteExecutor::new(DbConfig {
            path,
            ..DbConfig::default()
        });
        McpService::new(
            ToolRegistry::standard(db, QueryLimits::default()),
            Arc::new(RequestMetrics::default()),
        )
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(RequestId::Number(id)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    async fn result_of(service: &McpService, req: JsonRpcRequest) -> Value {
        let resp = service.handle(req).await.expect("response");
        assert!(resp.error.is_none(), "unexpected error: {:?}", resp.error);
        resp.result.expect("result")
    }

    fn tool_text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().expect("text content")
    }

    #[tokio::test]
    async fn initialize_reports_server_info_and_revision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(
            &service,
            request(
                1,
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "mcp-test-client", "version": "0.1.0"}
                }),
            ),
        )
        .await;
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn tools_list_reports_both_tools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(&service, request(2, "tools/list", json!({}))).await;
        let names: Vec<&str> = result["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .map(|t| t["name"].as_str().expect("name"))
            .collect();
        assert_eq!(names, vec!["execute_query", "list_tables"]);
        assert_eq!(
            result["tools"][0]["inputSchema"]["required"][0],
            "query"
        );
    }

    #[tokio::test]
    async fn call_list_tables_returns_table_names_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(
            &service,
            request(3, "tools/call", json!({"name": "list_tables", "arguments": {}})),
        )
        .await;
        assert_eq!(result["isError"], false);
        let tables: Vec<String> =
            serde_json::from_str(tool_text(&result)).expect("tables json");
        assert_eq!(tables, vec!["properties".to_string()]);
    }

    #[tokio::test]
    async fn call_execute_query_returns_rows_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(
            &service,
            request(
                4,
                "tools/call",
                json!({
                    "name": "execute_query",
                    "arguments": {"query": "SELECT id, city FROM properties ORDER BY id LIMIT 1"}
                }),
            ),
        )
        .await;
        assert_eq!(result["isError"], false);
        let rows: Vec<Value> = serde_json::from_str(tool_text(&result)).expect("rows json");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["city"], "Lisbon");
    }

    #[tokio::test]
    async fn call_execute_query_rejects_non_select() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(
            &service,
            request(
                5,
                "tools/call",
                json!({
                    "name": "execute_query",
                    "arguments": {"query": "DELETE FROM some_table"}
                }),
            ),
        )
        .await;
        assert_eq!(result["isError"], true);
        assert_eq!(tool_text(&result), QUERY_REJECTION_TEXT);
    }

    #[tokio::test]
    async fn call_execute_query_surfaces_sql_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(
            &service,
            request(
                6,
                "tools/call",
                json!({
                    "name": "execute_query",
                    "arguments": {"query": "SELECT * FROM missing_table"}
                }),
            ),
        )
        .await;
        assert_eq!(result["isError"], true);
        assert!(tool_text(&result).starts_with("Error executing query: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service
            .handle(request(
                7,
                "tools/call",
                json!({"name": "drop_everything", "arguments": {}}),
            ))
            .await
            .expect("response");
        let error = resp.error.expect("error");
        assert_eq!(error.code, sqlite_mcp_protocol::jsonrpc::INVALID_PARAMS);
        assert!(error.message.contains("drop_everything"));
    }

    #[tokio::test]
    async fn missing_query_argument_is_invalid_params() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service
            .handle(request(
                8,
                "tools/call",
                json!({"name": "execute_query", "arguments": {}}),
            ))
            .await
            .expect("response");
        let error = resp.error.expect("error");
        assert_eq!(error.code, sqlite_mcp_protocol::jsonrpc::INVALID_PARAMS);
        assert!(error.message.contains("query"));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service
            .handle(request(9, "resources/list", json!({})))
            .await
            .expect("response");
        let error = resp.error.expect("error");
        assert_eq!(error.code, sqlite_mcp_protocol::jsonrpc::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service
            .handle(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: None,
                method: "notifications/initialized".to_string(),
                params: Some(json!({})),
            })
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn ping_answers_with_an_empty_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let result = result_of(&service, request(10, "ping", json!({}))).await;
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn invalid_json_gets_a_parse_error_with_null_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service.handle_raw("{not json").await.expect("response");
        assert_eq!(resp.id, RequestId::Null);
        assert_eq!(
            resp.error.expect("error").code,
            sqlite_mcp_protocol::jsonrpc::PARSE_ERROR
        );
    }

    #[tokio::test]
    async fn valid_json_with_bad_envelope_is_invalid_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_for(fixture_db(&dir));
        let resp = service
            .handle_raw("{\"jsonrpc\": \"2.0\"}")
            .await
            .expect("response");
        assert_eq!(
            resp.error.expect("error").code,
            sqlite_mcp_protocol::jsonrpc::INVALID_REQUEST
        );
    }
}
