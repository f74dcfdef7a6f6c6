// SPDX-License-Identifier: Apache-2.0

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::guard::ensure_read_only;
use crate::limits::QueryLimits;
use crate::query_error::{QueryError, QueryErrorCode};
use crate::row_decode::row_to_object;

/// Run a guarded SELECT and decode the result set into column-keyed objects.
pub fn run_select(
    conn: &Connection,
    sql: &str,
    limits: &QueryLimits,
) -> Result<Vec<Map<String, Value>>, QueryError> {
    ensure_read_only(sql)?;
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| (*name).to_string())
        .collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= limits.max_rows {
            return Err(QueryError::new(
                QueryErrorCode::Budget,
                format!("result exceeded {} rows", limits.max_rows),
            ));
        }
        out.push(row_to_object(row, &columns)?);
    }
    Ok(out)
}

/// Like [`run_select`] but serialized to the compact JSON the tool returns,
/// with the response byte budget applied.
pub fn run_select_json(
    conn: &Connection,
    sql: &str,
    limits: &QueryLimits,
) -> Result<String, QueryError> {
    let rows = run_select(conn, sql, limits)?;
    let payload = serde_json::to_string(&rows)?;
    if payload.len() > limits.max_response_bytes {
        return Err(QueryError::new(
            QueryErrorCode::Budget,
            format!(
                "result exceeded {} bytes ({} serialized)",
                limits.max_response_bytes,
                payload.len()
            ),
        ));
    }
    Ok(payload)
}

/// Table names in database order.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>, QueryError> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
