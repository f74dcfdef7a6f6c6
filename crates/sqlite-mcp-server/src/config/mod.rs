use serde::Serialize;
use sqlite_mcp_query::QueryLimits;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transport {
    Sse,
    Stdio,
}

impl Transport {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!("unsupported transport: {other}; use sse or stdio")),
        }
    }
}

/// Map the deployment's LOG_LEVEL vocabulary onto tracing filter directives.
pub fn log_level_directive(raw: &str) -> Result<&'static str, String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Ok("debug"),
        "INFO" => Ok("info"),
        "WARNING" => Ok("warn"),
        "ERROR" => Ok("error"),
        "CRITICAL" => Ok("error"),
        other => Err(format!(
            "invalid LOG_LEVEL {other}; expected DEBUG, INFO, WARNING, ERROR, or CRITICAL"
        )),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DbConfig {
    pub path: PathBuf,
    pub open_timeout: Duration,
    pub sql_timeout: Duration,
    pub max_concurrent_queries: usize,
    pub pragma_cache_kib: i64,
    pub pragma_mmap_bytes: i64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/database/app.db"),
            open_timeout: Duration::from_secs(3),
            sql_timeout: Duration::from_millis(800),
            max_concurrent_queries: 16,
            pragma_cache_kib: 32 * 1024,
            pragma_mmap_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub bind: String,
    pub transport: Transport,
    pub max_body_bytes: usize,
    pub session_buffer: usize,
    pub keepalive_interval: Duration,
    pub readiness_probe_interval: Duration,
    pub shutdown_drain: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            transport: Transport::Sse,
            max_body_bytes: 64 * 1024,
            session_buffer: 64,
            keepalive_interval: Duration::from_secs(15),
            readiness_probe_interval: Duration::from_secs(15),
            shutdown_drain: Duration::from_millis(5000),
        }
    }
}

pub fn validate_startup_config(
    server: &ServerConfig,
    db: &DbConfig,
    limits: &QueryLimits,
) -> Result<(), String> {
    if db.path.as_os_str().is_empty() {
        return Err("database path must not be empty".to_string());
    }
    if db.open_timeout.is_zero() || db.sql_timeout.is_zero() {
        return Err("timeouts must be > 0".to_string());
    }
    if db.max_concurrent_queries == 0 {
        return Err("max concurrent queries must be > 0".to_string());
    }
    if server.max_body_bytes == 0 {
        return Err("max body bytes must be > 0".to_string());
    }
    if server.session_buffer == 0 {
        return Err("session buffer must be > 0".to_string());
    }
    if limits.max_rows == 0 || limits.max_response_bytes == 0 {
        return Err("query budgets must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_cover_the_deployment_vocabulary() {
        assert_eq!(log_level_directive("DEBUG"), Ok("debug"));
        assert_eq!(log_level_directive("info"), Ok("info"));
        assert_eq!(log_level_directive("Warning"), Ok("warn"));
        assert_eq!(log_level_directive("ERROR"), Ok("error"));
        assert_eq!(log_level_directive("CRITICAL"), Ok("error"));
        assert!(log_level_directive("TRACE").is_err());
    }

    #[test]
    fn transport_parse_accepts_both_transports() {
        assert_eq!(Transport::parse("sse"), Ok(Transport::Sse));
        assert_eq!(Transport::parse(" STDIO "), Ok(Transport::Stdio));
        assert!(Transport::parse("websocket").is_err());
    }

    #[test]
    fn startup_validation_rejects_zero_budgets() {
        let server = ServerConfig::default();
        let db = DbConfig::default();
        let limits = QueryLimits {
            max_rows: 0,
            ..QueryLimits::default()
        };
        let err = validate_startup_config(&server, &db, &limits).expect_err("zero rows");
        assert!(err.contains("query budgets"));
    }

    #[test]
    fn startup_validation_rejects_empty_db_path() {
        let server = ServerConfig::default();
        let db = DbConfig {
            path: PathBuf::new(),
            ..DbConfig::default()
        };
        let err =
            validate_startup_config(&server, &db, &QueryLimits::default()).expect_err("empty path");
        assert!(err.contains("database path"));
    }

    #[test]
    fn startup_validation_rejects_zero_timeouts() {
        let server = ServerConfig::default();
        let db = DbConfig {
            sql_timeout: Duration::ZERO,
            ..DbConfig::default()
        };
        let err = validate_startup_config(&server, &db, &QueryLimits::default())
            .expect_err("zero timeout");
        assert!(err.contains("timeouts"));
    }
}
