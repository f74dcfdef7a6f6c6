// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::mcp::McpService;

/// Newline-delimited JSON-RPC over stdin/stdout. One frame per line;
/// notifications produce no output; EOF ends the loop. Logging must already
/// be routed to stderr so stdout stays protocol-clean.
pub async fn run(service: Arc<McpService>) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("stdin read failed: {e}"))?
    {
        let frame = line.trim();
        if frame.is_empty() {
            continue;
        }
        let Some(response) = service.handle_raw(frame).await else {
            continue;
        };
        let payload = serde_json::to_string(&response)
            .map_err(|e| format!("response serialization failed: {e}"))?;
        out.write_all(payload.as_bytes())
            .await
            .map_err(|e| format!("stdout write failed: {e}"))?;
        out.write_all(b"\n")
            .await
            .map_err(|e| format!("stdout write failed: {e}"))?;
        out.flush()
            .await
            .map_err(|e| format!("stdout flush failed: {e}"))?;
    }
    debug!("stdin closed, stdio transport exiting");
    Ok(())
}
