//! Response classifier
//!
//! Upstream APIs often answer 200 with a body that still encodes a failure.
//! The rules below are checked in order; the first one that matches decides.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::mapping::extract_message;

/// Fields whose presence marks a body as carrying real results
const SUCCESS_FIELDS: &[&str] = &[
    "patient",
    "patients",
    "patientGUID",
    "patientId",
    "slots",
    "groups",
    "availableSlots",
    "appointment",
    "appointments",
    "appointmentGUID",
    "appointmentId",
    "location",
    "locations",
    "records",
];

/// Fields that turn a `success: false` body into guidance for the agent
const GUIDANCE_FIELDS: &[&str] = &["llm_guidance", "guidance", "action_required"];

/// A body recognised as a semantic failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// Name of the rule that matched
    pub rule: &'static str,
    pub message: String,
}

/// One shape rule
pub struct ResponseRule {
    pub name: &'static str,
    pub check: fn(&Map<String, Value>) -> Option<String>,
}

/// Rules in evaluation order
pub const RESPONSE_RULES: &[ResponseRule] = &[
    ResponseRule {
        name: "success_false",
        check: success_false_without_guidance,
    },
    ResponseRule {
        name: "code_false",
        check: code_false_with_error,
    },
    ResponseRule {
        name: "bare_error",
        check: bare_error_field,
    },
    ResponseRule {
        name: "error_message",
        check: error_message_without_success,
    },
];

/// First matching rule for a decoded body, if any
pub fn classify_response(body: &Value) -> Option<ClassifiedError> {
    let map = body.as_object()?;
    RESPONSE_RULES.iter().find_map(|rule| {
        (rule.check)(map).map(|message| ClassifiedError {
            rule: rule.name,
            message,
        })
    })
}

fn has_any(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| map.get(*key).map_or(false, |v| !v.is_null()))
}

fn non_empty_error(map: &Map<String, Value>) -> bool {
    match map.get("error") {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(inner)) => !inner.is_empty(),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

fn message_of(map: &Map<String, Value>, fallback: &str) -> String {
    extract_message(&Value::Object(map.clone())).unwrap_or_else(|| fallback.to_string())
}

fn success_false_without_guidance(map: &Map<String, Value>) -> Option<String> {
    if map.get("success") == Some(&Value::Bool(false)) && !has_any(map, GUIDANCE_FIELDS) {
        Some(message_of(map, "success flag is false"))
    } else {
        None
    }
}

fn code_false_with_error(map: &Map<String, Value>) -> Option<String> {
    if map.get("code") == Some(&Value::Bool(false)) && non_empty_error(map) {
        Some(message_of(map, "code flag is false"))
    } else {
        None
    }
}

fn bare_error_field(map: &Map<String, Value>) -> Option<String> {
    if non_empty_error(map) && !has_any(map, SUCCESS_FIELDS) {
        Some(message_of(map, "error field present"))
    } else {
        None
    }
}

fn error_message_without_success(map: &Map<String, Value>) -> Option<String> {
    let message = map.get("message")?.as_str()?;
    let marked_success = map.get("success") == Some(&Value::Bool(true)) || has_any(map, SUCCESS_FIELDS);
    if message.to_lowercase().contains("error") && !marked_success {
        Some(message.to_string())
    } else {
        None
    }
}
