//! Legacy `movies` stores a single writer as a scalar id in `writer` and
//! several writers as a JSON array of `{"id": ..}` objects in `writers`
//! (leaving `writer` meaningless). Everything downstream sees the array form.

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::models::WriterRef;

/// Fold the two legacy writer columns into one JSON array string.
pub fn normalize_writer_refs(writer: Option<&str>, writers: Option<&str>) -> String {
    let writers = writers.map(str::trim).unwrap_or_default();
    if !writers.is_empty() {
        return writers.to_string();
    }
    match writer.map(str::trim).filter(|w| !w.is_empty()) {
        Some(id) => json!([{ "id": id }]).to_string(),
        None => "[]".to_string(),
    }
}

/// Decode a normalized `writers` value.
pub fn parse_writer_refs(raw: &str) -> Result<Vec<WriterRef>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub(crate) fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "writer id must be a string or number, got {other}"
        ))),
    }
}
