//! Parameter normalizer
//!
//! Captured tool inputs carry placeholder and masked values ("NULL", "N/A",
//! `<REDACTED>`, ...) that must never reach an upstream API as real data.

use serde_json::{Map, Value};

/// Map of tool parameters as captured from a trace
pub type Params = Map<String, Value>;

/// Sentinels compared case-insensitively after trimming
const SENTINELS: &[&str] = &[
    "null",
    "undefined",
    "none",
    "n/a",
    "na",
    "nil",
    "<redacted>",
    "[redacted]",
    "redacted",
    "***",
    "<masked>",
    "[masked]",
    "<pii>",
    "[pii]",
];

/// True when a value is absent or a known placeholder
pub fn is_empty_sentinel(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.is_empty() || SENTINELS.iter().any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
        }
        _ => false,
    }
}

/// Copy of `params` without sentinel-valued entries; nothing else changes
pub fn normalize_params(params: &Params) -> Params {
    params
        .iter()
        .filter(|(_, value)| !is_empty_sentinel(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keys dropped by `normalize_params`, in input order
pub fn removed_keys(params: &Params) -> Vec<String> {
    params
        .iter()
        .filter(|(_, value)| is_empty_sentinel(value))
        .map(|(key, _)| key.clone())
        .collect()
}

/// String value of a parameter, accepting numbers and booleans too
pub fn param_str(params: &Params, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First present parameter among several aliases
pub fn first_param(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| param_str(params, key))
}
