#![forbid(unsafe_code)]

//! The SQL surface of the sqlite-mcp-server: a read-only statement guard,
//! row decoding into JSON, and the executors behind the `execute_query` and
//! `list_tables` tools.

mod executor;
mod guard;
mod limits;
mod query_error;
mod row_decode;

pub const CRATE_NAME: &str = "sqlite-mcp-query";

pub use executor::{list_tables, run_select, run_select_json};
pub use guard::{ensure_read_only, GuardError};
pub use limits::QueryLimits;
pub use query_error::{QueryError, QueryErrorCode};
pub use row_decode::{row_to_object, value_ref_to_json};
