//! Action registries
//!
//! Each tenant kind owns one closed table mapping `(tool, action)` to an
//! `ActionConfig`. The table is picked once per request from the tenant
//! kind and never mixed with the other one, so body builders never branch
//! on tenant.

pub mod legacy;
pub mod rest;

use std::fmt;

use serde_json::{json, Map, Value};

use crate::config::{TenantConfig, TenantKind};
use crate::core::HttpMethod;
use crate::error::{EngineError, Result};
use crate::normalize::{param_str, Params};

/// Tools whose calls can be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Patient lookup/creation tool
    Patient,
    /// Slot search and booking tool
    Scheduling,
}

impl ToolName {
    pub const PATIENT: &'static str = "chord_ortho_patient";
    pub const SCHEDULING: &'static str = "schedule_appointment_ortho";

    /// Resolve a captured tool name
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim() {
            Self::PATIENT => Ok(ToolName::Patient),
            Self::SCHEDULING => Ok(ToolName::Scheduling),
            other => Err(EngineError::UnknownTool(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Patient => Self::PATIENT,
            ToolName::Scheduling => Self::SCHEDULING,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values a body builder may draw on besides the caller's parameters
pub struct BuildContext<'a> {
    pub correlation_token: &'a str,
    pub tenant: &'a TenantConfig,
}

impl BuildContext<'_> {
    /// Caller value, else the tenant default
    pub fn param_or_default(
        &self,
        params: &Params,
        key: &str,
        default: &Option<String>,
    ) -> Option<String> {
        param_str(params, key).or_else(|| default.clone())
    }
}

/// Outcome of an action's validator when it does not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Parameters are complete
    Valid,
    /// Known recoverable gap; return this payload instead of calling upstream
    Guided(Value),
}

pub type ValidateFn = fn(&Params, &BuildContext<'_>) -> Result<Validation>;
pub type BuildBodyFn = fn(&Params, &BuildContext<'_>) -> Value;
pub type EndpointFn = fn(&Params, &BuildContext<'_>) -> Result<String>;

/// Where an action sends its request
#[derive(Clone, Copy)]
pub enum Endpoint {
    /// Fixed path below the tenant base URL
    Static(&'static str),
    /// Path computed from parameters (e.g. ids embedded in the path)
    Dynamic(EndpointFn),
}

impl Endpoint {
    /// Path relative to the tenant base URL
    pub fn resolve(&self, params: &Params, ctx: &BuildContext<'_>) -> Result<String> {
        match self {
            Endpoint::Static(path) => Ok((*path).to_string()),
            Endpoint::Dynamic(f) => f(params, ctx),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Static(path) => write!(f, "Static({})", path),
            Endpoint::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Immutable description of one tool action
#[derive(Clone, Copy)]
pub struct ActionConfig {
    pub name: &'static str,
    pub endpoint: Endpoint,
    pub method: HttpMethod,
    pub build_body: BuildBodyFn,
    pub validate: ValidateFn,
    pub success_label: &'static str,
    /// Runs through the expansion search instead of a single call
    pub search: bool,
    /// Read-only lookups that may be served from the info cache
    pub cacheable: bool,
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("search", &self.search)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

/// One tenant kind's closed action table
#[derive(Debug)]
pub struct ActionRegistry {
    pub kind: TenantKind,
    patient: &'static [ActionConfig],
    scheduling: &'static [ActionConfig],
}

static LEGACY_REGISTRY: ActionRegistry = ActionRegistry {
    kind: TenantKind::Legacy,
    patient: legacy::PATIENT_ACTIONS,
    scheduling: legacy::SCHEDULING_ACTIONS,
};

static REST_REGISTRY: ActionRegistry = ActionRegistry {
    kind: TenantKind::Rest,
    patient: rest::PATIENT_ACTIONS,
    scheduling: rest::SCHEDULING_ACTIONS,
};

/// Registry for a tenant kind
pub fn registry_for(kind: TenantKind) -> &'static ActionRegistry {
    match kind {
        TenantKind::Legacy => &LEGACY_REGISTRY,
        TenantKind::Rest => &REST_REGISTRY,
    }
}

impl ActionRegistry {
    /// All actions of a tool
    pub fn actions(&self, tool: ToolName) -> &'static [ActionConfig] {
        match tool {
            ToolName::Patient => self.patient,
            ToolName::Scheduling => self.scheduling,
        }
    }

    /// Action names of a tool, in table order
    pub fn action_names(&self, tool: ToolName) -> Vec<String> {
        self.actions(tool).iter().map(|a| a.name.to_string()).collect()
    }

    /// Look up an action, naming the valid set on failure
    pub fn lookup(&self, tool: ToolName, action: &str) -> Result<&'static ActionConfig> {
        self.actions(tool)
            .iter()
            .find(|a| a.name == action)
            .ok_or_else(|| EngineError::UnknownAction {
                tool: tool.to_string(),
                action: action.to_string(),
                valid: self.action_names(tool),
            })
    }
}

// Shared helpers for the builder and validator tables

/// Fail with a domain message when any of `keys` is missing
pub(crate) fn require(params: &Params, keys: &[&str], what: &str, action: &str) -> Result<()> {
    if keys.iter().any(|key| param_str(params, key).is_some()) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "missing {} for action {} (expected one of: {})",
            what,
            action,
            keys.join(", ")
        )))
    }
}

/// Names of required fields that are absent
pub(crate) fn missing_fields(params: &Params, required: &[(&str, Option<String>)]) -> Vec<String> {
    required
        .iter()
        .filter(|(key, default)| param_str(params, key).is_none() && default.is_none())
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Structured non-error response asking the caller to supply fields
pub fn missing_booking_fields_payload(action: &str, missing: &[String]) -> Value {
    json!({
        "success": false,
        "error_type": "missing_booking_fields",
        "message": format!("Cannot complete {}: missing {}", action, missing.join(", ")),
        "missing_fields": missing,
        "llm_guidance": {
            "action": "collect_missing_fields",
            "instruction": format!(
                "Collect {} from the caller or a prior slot search, then call {} again",
                missing.join(", "),
                action
            ),
            "missing_fields": missing,
        }
    })
}

/// Insert a string field when present
pub(crate) fn put(body: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        body.insert(key.to_string(), Value::String(v));
    }
}

/// Copy a parameter through unchanged when present
pub(crate) fn copy(body: &mut Map<String, Value>, params: &Params, from: &str, to: &str) {
    if let Some(v) = params.get(from) {
        body.insert(to.to_string(), v.clone());
    }
}

/// Positive integer parameter with a fallback
pub(crate) fn param_u64(params: &Params, key: &str, default: u64) -> u64 {
    match params.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Validator for actions that need nothing beyond defaults
pub(crate) fn always_valid(_: &Params, _: &BuildContext<'_>) -> Result<Validation> {
    Ok(Validation::Valid)
}
