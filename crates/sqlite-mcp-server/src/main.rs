#![forbid(unsafe_code)]

use sqlite_mcp_query::QueryLimits;
use sqlite_mcp_server::{
    build_router, config, transport, validate_startup_config, AppState, DbConfig, ServerConfig,
    Transport,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn init_tracing(log_level: &str, log_json: bool, to_stderr: bool) -> Result<(), String> {
    let directive = config::log_level_directive(log_level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    match (log_json, to_stderr) {
        (true, true) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        (true, false) => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        (false, true) => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        (false, false) => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let transport = Transport::parse(&env::var("MCP_TRANSPORT").unwrap_or_else(|_| "sse".into()))?;
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    // On stdio, stdout belongs to the protocol; logs go to stderr.
    init_tracing(
        &log_level,
        env_bool("MCP_LOG_JSON", true),
        transport == Transport::Stdio,
    )?;

    let db_config = DbConfig {
        path: PathBuf::from(env::var("DB_PATH").unwrap_or_else(|_| "/database/app.db".into())),
        open_timeout: env_duration_ms("MCP_DB_OPEN_TIMEOUT_MS", 3000),
        sql_timeout: env_duration_ms("MCP_SQL_TIMEOUT_MS", 800),
        max_concurrent_queries: env_usize("MCP_MAX_CONCURRENT_QUERIES", 16),
        pragma_cache_kib: env_u64("MCP_SQLITE_CACHE_KIB", 32 * 1024) as i64,
        pragma_mmap_bytes: env_u64("MCP_SQLITE_MMAP_BYTES", 256 * 1024 * 1024) as i64,
    };
    let server_config = ServerConfig {
        bind: env::var("MCP_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        transport,
        max_body_bytes: env_usize("MCP_MAX_BODY_BYTES", 64 * 1024),
        session_buffer: env_usize("MCP_SESSION_BUFFER", 64),
        keepalive_interval: Duration::from_secs(env_u64("MCP_KEEPALIVE_SECS", 15)),
        readiness_probe_interval: Duration::from_secs(env_u64("MCP_READINESS_PROBE_SECS", 15)),
        shutdown_drain: env_duration_ms("MCP_SHUTDOWN_DRAIN_MS", 5000),
    };
    let limits = QueryLimits {
        max_rows: env_usize("MCP_MAX_ROWS", 10_000),
        max_response_bytes: env_usize("MCP_RESPONSE_MAX_BYTES", 512 * 1024),
    };
    validate_startup_config(&server_config, &db_config, &limits)?;

    let bind_addr = server_config.bind.clone();
    let drain = server_config.shutdown_drain;
    let probe_interval = server_config.readiness_probe_interval;
    let state = AppState::new(server_config, db_config, limits);

    match state.db.probe().await {
        Ok(()) => info!("database ready at {}", state.db.path().display()),
        Err(e) => {
            error!("database probe failed for {}: {e}", state.db.path().display());
            state.ready.store(false, Ordering::Relaxed);
        }
    }

    if transport == Transport::Stdio {
        info!("serving MCP over stdio");
        return transport::stdio::run(Arc::clone(&state.mcp)).await;
    }

    let db_bg = state.db.clone();
    let ready_bg = Arc::clone(&state.ready);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(probe_interval);
        loop {
            interval.tick().await;
            match db_bg.probe().await {
                Ok(()) => ready_bg.store(true, Ordering::Relaxed),
                Err(e) => {
                    error!("database probe failed: {e}");
                    ready_bg.store(false, Ordering::Relaxed);
                }
            }
        }
    });

    let app = build_router(state.clone());
    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket
        .set_keepalive(env_bool("MCP_TCP_KEEPALIVE_ENABLED", true))
        .map_err(|e| format!("set_keepalive failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("sqlite-mcp-server listening on {bind_addr}");

    let accepting = Arc::clone(&state.accepting_requests);
    let sessions = Arc::clone(&state.sessions);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            // Stop reporting ready, let in-flight posts deliver, then end
            // the open SSE streams so the drain can complete.
            accepting.store(false, Ordering::Relaxed);
            tokio::time::sleep(drain).await;
            let closed = sessions.close_all().await;
            info!("shutdown drain complete, closed {closed} sessions");
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
