//! JSON utility functions

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Stringify a scalar JSON value the way it should appear in a metric result.
///
/// Strings are returned as-is, whole floats lose their fractional part and
/// `null` becomes an empty string. Arrays and objects are serialized.
pub fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(f) = n.as_f64() {
                format_float(f)
            } else {
                n.to_string()
            }
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Shortest decimal rendering of a float, with special values spelled
/// `NaN`, `+Inf` and `-Inf`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{f}")
    }
}

/// Deterministic JSON object for a string map (keys sorted)
pub fn encode_string_map(map: &BTreeMap<String, String>) -> Result<String, serde_json::Error> {
    serde_json::to_string(map)
}

/// Decode a JSON object of strings produced by [`encode_string_map`]
pub fn decode_string_map(s: &str) -> Result<BTreeMap<String, String>, serde_json::Error> {
    serde_json::from_str(s)
}
