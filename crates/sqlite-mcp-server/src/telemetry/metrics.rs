use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    tool_latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    tool_calls: Mutex<HashMap<String, u64>>,
    tool_errors: Mutex<HashMap<String, u64>>,
    pub sessions_opened: AtomicU64,
    pub sessions_closed: AtomicU64,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_default()
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn observe_tool_call(&self, tool: &str, latency: Duration, is_error: bool) {
        let mut calls = self.tool_calls.lock().await;
        *calls.entry(tool.to_string()).or_insert(0) += 1;
        drop(calls);
        if is_error {
            let mut errors = self.tool_errors.lock().await;
            *errors.entry(tool.to_string()).or_insert(0) += 1;
        }
        let mut latency_map = self.tool_latency_ns.lock().await;
        latency_map
            .entry(tool.to_string())
            .or_default()
            .push(latency.as_nanos() as u64);
    }

    /// Prometheus text exposition for `/metrics`.
    pub(crate) async fn render(&self, open_sessions: usize) -> String {
        let mut body = String::new();
        {
            let counts = self.counts.lock().await;
            let mut keys: Vec<_> = counts.keys().cloned().collect();
            keys.sort();
            for (route, status) in keys {
                body.push_str(&format!(
                    "mcp_requests_total{{version=\"{METRIC_VERSION}\",route=\"{route}\",status=\"{status}\"}} {}\n",
                    counts[&(route.clone(), status)]
                ));
            }
        }
        {
            let latency = self.latency_ns.lock().await;
            let mut routes: Vec<_> = latency.keys().cloned().collect();
            routes.sort();
            for route in routes {
                let values = &latency[&route];
                body.push_str(&format!(
                    "mcp_request_latency_p50_seconds{{version=\"{METRIC_VERSION}\",route=\"{route}\"}} {:.6}\n",
                    percentile_ns(values, 0.50) as f64 / 1e9
                ));
                body.push_str(&format!(
                    "mcp_request_latency_p95_seconds{{version=\"{METRIC_VERSION}\",route=\"{route}\"}} {:.6}\n",
                    percentile_ns(values, 0.95) as f64 / 1e9
                ));
            }
        }
        {
            let calls = self.tool_calls.lock().await;
            let errors = self.tool_errors.lock().await;
            let latency = self.tool_latency_ns.lock().await;
            let mut tools: Vec<_> = calls.keys().cloned().collect();
            tools.sort();
            for tool in tools {
                body.push_str(&format!(
                    "mcp_tool_calls_total{{version=\"{METRIC_VERSION}\",tool=\"{tool}\"}} {}\n",
                    calls[&tool]
                ));
                body.push_str(&format!(
                    "mcp_tool_errors_total{{version=\"{METRIC_VERSION}\",tool=\"{tool}\"}} {}\n",
                    errors.get(&tool).copied().unwrap_or(0)
                ));
                if let Some(values) = latency.get(&tool) {
                    body.push_str(&format!(
                        "mcp_tool_latency_p95_seconds{{version=\"{METRIC_VERSION}\",tool=\"{tool}\"}} {:.6}\n",
                        percentile_ns(values, 0.95) as f64 / 1e9
                    ));
                }
            }
        }
        body.push_str(&format!(
            "mcp_sessions_open{{version=\"{METRIC_VERSION}\"}} {open_sessions}\n"
        ));
        body.push_str(&format!(
            "mcp_sessions_opened_total{{version=\"{METRIC_VERSION}\"}} {}\n",
            self.sessions_opened.load(Ordering::Relaxed)
        ));
        body.push_str(&format!(
            "mcp_sessions_closed_total{{version=\"{METRIC_VERSION}\"}} {}\n",
            self.sessions_closed.load(Ordering::Relaxed)
        ));
        body
    }
}

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}
