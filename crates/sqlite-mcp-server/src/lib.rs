#![forbid(unsafe_code)]

//! MCP server exposing read-only SQL access to a single SQLite database,
//! over the SSE transport (HTTP) or stdio.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

pub mod config;
pub mod db;
mod http;
pub mod mcp;
pub mod session;
pub mod telemetry;
pub mod tools;
pub mod transport;

pub const CRATE_NAME: &str = "sqlite-mcp-server";

pub use config::{validate_startup_config, DbConfig, ServerConfig, Transport};
pub use db::{DbError, SqliteExecutor};
pub use http::handlers::LANDING_MESSAGE;
pub use mcp::{McpService, SERVER_NAME};
pub use session::{SessionError, SessionRegistry};
pub use telemetry::RequestMetrics;
pub use tools::{Tool, ToolCallError, ToolRegistry, QUERY_REJECTION_TEXT};

use sqlite_mcp_query::QueryLimits;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: SqliteExecutor,
    pub mcp: Arc<McpService>,
    pub sessions: Arc<SessionRegistry>,
    pub ready: Arc<AtomicBool>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig, db_config: DbConfig, limits: QueryLimits) -> Self {
        let db = SqliteExecutor::new(db_config);
        let metrics = Arc::new(RequestMetrics::default());
        let registry = ToolRegistry::standard(db.clone(), limits);
        let sessions = SessionRegistry::new(config.session_buffer);
        Self {
            mcp: Arc::new(McpService::new(registry, Arc::clone(&metrics))),
            config: Arc::new(config),
            db,
            sessions,
            ready: Arc::new(AtomicBool::new(true)),
            accepting_requests: Arc::new(AtomicBool::new(true)),
            metrics,
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handlers::landing_handler))
        .route("/sse", get(http::handlers::sse_handler))
        .route("/messages/", post(http::handlers::messages_handler))
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .with_state(state)
}
