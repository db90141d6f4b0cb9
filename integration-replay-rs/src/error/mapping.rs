//! Error mapping for upstream HTTP outcomes
//!
//! Converts non-2xx responses from the practice APIs and the ordering
//! service into the normalized `EngineError::Upstream` shape.

use reqwest::StatusCode;
use serde_json::Value;

use super::{EngineError, ErrorContext};

/// Canonical reason phrase for a status code
pub fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Pull a human-readable message out of a decoded error body
pub fn extract_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => {
            for key in ["message", "error", "errorMessage", "detail"] {
                match map.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                    Some(Value::Array(items)) if !items.is_empty() => {
                        let joined = items
                            .iter()
                            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                            .collect::<Vec<_>>()
                            .join("; ");
                        return Some(joined);
                    }
                    Some(Value::Object(inner)) => {
                        if let Some(Value::String(s)) = inner.get("message") {
                            return Some(s.clone());
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Map a non-2xx outcome to an EngineError
pub fn map_http_error(
    status: u16,
    status_text: &str,
    body: &Value,
    context: &mut ErrorContext,
) -> EngineError {
    context.status_code = Some(status);
    context.add("category", classify_http_error(status));

    let message = extract_message(body).unwrap_or_else(|| {
        let raw = body.to_string();
        if raw.len() > 100 {
            format!("{:.100}...", raw)
        } else {
            raw
        }
    });

    match status {
        408 | 504 => EngineError::timeout(format!("HTTP {} {}: {}", status, status_text, message)),
        _ => EngineError::upstream(status, status_text, message),
    }
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_error(status: u16) -> &'static str {
    match status {
        400 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 => "timeout",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}
