use rusqlite::{Connection, OpenFlags};
use sqlite_mcp_query::QueryError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::DbConfig;

#[derive(Debug)]
pub struct DbError(pub String);

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for DbError {}

impl From<QueryError> for DbError {
    fn from(value: QueryError) -> Self {
        Self(value.to_string())
    }
}

/// Gate onto the read-only database. Every query opens its own connection,
/// mirroring the connection-per-call behavior the service has always had;
/// the semaphore bounds the per-process fan-out.
#[derive(Clone)]
pub struct SqliteExecutor {
    path: PathBuf,
    sql_timeout: Duration,
    open_timeout: Duration,
    pragma_cache_kib: i64,
    pragma_mmap_bytes: i64,
    query_semaphore: Arc<Semaphore>,
}

impl SqliteExecutor {
    #[must_use]
    pub fn new(cfg: DbConfig) -> Self {
        Self {
            path: cfg.path,
            sql_timeout: cfg.sql_timeout,
            open_timeout: cfg.open_timeout,
            pragma_cache_kib: cfg.pragma_cache_kib,
            pragma_mmap_bytes: cfg.pragma_mmap_bytes,
            query_semaphore: Arc::new(Semaphore::new(cfg.max_concurrent_queries)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against a fresh read-only connection on the blocking
    /// pool, bounded by the open and SQL timeouts combined.
    pub async fn run<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, QueryError> + Send + 'static,
    {
        let _permit = self
            .query_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DbError(e.to_string()))?;
        let path = self.path.clone();
        let cache_kib = self.pragma_cache_kib;
        let mmap_bytes = self.pragma_mmap_bytes;
        let deadline = self.open_timeout + self.sql_timeout;
        let outcome = timeout(
            deadline,
            tokio::task::spawn_blocking(move || {
                let conn = open_read_only(&path, cache_kib, mmap_bytes)
                    .map_err(|e| DbError(e.to_string()))?;
                f(&conn).map_err(DbError::from)
            }),
        )
        .await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(DbError(join.to_string())),
            Err(_) => Err(DbError(format!(
                "query timed out after {} ms",
                deadline.as_millis()
            ))),
        }
    }

    /// Cheap health probe used at startup and by the readiness loop.
    pub async fn probe(&self) -> Result<(), DbError> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(QueryError::from)
        })
        .await
    }
}

fn open_read_only(path: &Path, cache_kib: i64, mmap_bytes: i64) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.set_prepared_statement_cache_capacity(128);
    // query_only first: it is the enforcement pragma, the rest are sizing.
    conn.execute_batch(&format!(
        "PRAGMA query_only=ON; PRAGMA temp_store=MEMORY; PRAGMA cache_size=-{cache_kib}; PRAGMA mmap_size={mmap_bytes};"
    ))?;
    Ok(conn)
}
