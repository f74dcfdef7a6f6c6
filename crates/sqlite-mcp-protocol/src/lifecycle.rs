// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision this server implements.
pub const PROTOCOL_REVISION: &str = "2024-11-05";

const SUPPORTED_REVISIONS: &[&str] = &["2024-11-05"];

/// Echo the client's revision when we support it, otherwise answer with our
/// own and let the client decide whether to continue.
#[must_use]
pub fn negotiate_revision(requested: &str) -> &'static str {
    SUPPORTED_REVISIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(PROTOCOL_REVISION)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

/// Client half of the `initialize` exchange. Capabilities are kept opaque:
/// this server inspects none of them and clients keep extending the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negotiation_echoes_supported_revision() {
        assert_eq!(negotiate_revision("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_revision("0.1.0"), PROTOCOL_REVISION);
    }

    #[test]
    fn initialize_params_accept_arbitrary_capabilities() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "0.1.0",
            "capabilities": {"experimental": {"x": 1}},
            "clientInfo": {"name": "mcp-test-client", "version": "0.1.0"}
        }))
        .expect("initialize params");
        assert_eq!(params.protocol_version, "0.1.0");
        assert_eq!(
            params.client_info.expect("client info").name,
            "mcp-test-client"
        );
    }

    #[test]
    fn initialize_result_serializes_camel_case() {
        let result = InitializeResult {
            protocol_version: PROTOCOL_REVISION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: Implementation::new("sqlite-mcp-server", "0.1.0"),
            instructions: None,
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["protocolVersion"], PROTOCOL_REVISION);
        assert_eq!(value["serverInfo"]["name"], "sqlite-mcp-server");
        assert_eq!(value["capabilities"]["tools"]["listChanged"], false);
        assert!(value.get("instructions").is_none());
    }
}
