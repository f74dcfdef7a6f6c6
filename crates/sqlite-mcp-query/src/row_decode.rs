use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};

/// Decode one SQLite value into JSON. Blobs become base64 text; a REAL that
/// JSON cannot represent (NaN, infinity) becomes null.
#[must_use]
pub fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(STANDARD.encode(b)),
    }
}

/// Decode a row into a column-name-keyed object. A duplicated column name
/// keeps the last value, the same shape a zip-into-dict produces.
pub fn row_to_object(
    row: &rusqlite::Row<'_>,
    columns: &[String],
) -> rusqlite::Result<Map<String, Value>> {
    let mut object = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        object.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
    }
    Ok(object)
}
