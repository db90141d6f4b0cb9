//! Error handling for the replay engine
//!
//! This module provides the single error channel shared by replay and
//! diagnosis:
//! - Caller errors (unknown tool/action, failed validation)
//! - Upstream transport errors (non-2xx, timeout, connection)
//! - Upstream semantic errors (2xx bodies that encode a failure)
//! - Rich context (endpoint, status, decision trace) for debugging

use std::fmt;
use std::collections::HashMap;
use thiserror::Error;

pub mod mapping;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Context key under which the replay decision trace is attached
pub const PRE_CALL_LOGS_KEY: &str = "pre_call_logs";

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Required-field or shape errors in caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tool name not present in any registry
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    /// Action not present in the selected registry
    #[error("Unknown action '{action}' for tool '{tool}'. Valid actions: {}", .valid.join(", "))]
    UnknownAction {
        tool: String,
        action: String,
        valid: Vec<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Response parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Non-2xx HTTP outcome
    #[error("HTTP {status} {status_text}: {message}")]
    Upstream {
        status: u16,
        status_text: String,
        message: String,
    },

    /// 2xx outcome whose body encodes a failure
    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<EngineError>,
        context: ErrorContext,
    },
}

impl EngineError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        EngineError::Network(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        EngineError::Timeout(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    /// Create a parsing error
    pub fn parsing(message: impl Into<String>) -> Self {
        EngineError::Parsing(message.into())
    }

    /// Create an upstream HTTP error
    pub fn upstream(status: u16, status_text: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Upstream {
            status,
            status_text: status_text.into(),
            message: message.into(),
        }
    }

    /// Create an upstream semantic error
    pub fn upstream_rejected(message: impl Into<String>) -> Self {
        EngineError::UpstreamRejected(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        EngineError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Get the context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            EngineError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            EngineError::Upstream { status, .. } => Some(*status),
            EngineError::WithContext { inner, context } => {
                context.status_code.or_else(|| inner.status_code())
            }
            _ => None,
        }
    }

    /// Decision trace recorded before the failure, if one was attached
    pub fn pre_call_logs(&self) -> Vec<String> {
        self.context()
            .and_then(|c| c.data.get(PRE_CALL_LOGS_KEY))
            .map(|logs| logs.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// True for caller mistakes that re-running will not fix
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.root(),
            EngineError::Validation(_)
                | EngineError::UnknownTool(_)
                | EngineError::UnknownAction { .. }
        )
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component that generated the error
    pub service: String,

    /// Time the error was recorded
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Upstream error code
    pub error_code: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific component
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    /// Add an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Add an error code
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Add an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attach a decision trace
    pub fn pre_call_logs(mut self, logs: &[String]) -> Self {
        self.data.insert(PRE_CALL_LOGS_KEY.to_string(), logs.join("\n"));
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

/// Convert reqwest errors to EngineError
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let context = ErrorContext::for_service("http_client");

        let engine_error = if err.is_timeout() {
            EngineError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            EngineError::network(format!("Connection error: {}", err))
        } else if err.is_request() {
            EngineError::network(format!("Request failed: {}", err))
        } else if err.is_redirect() {
            EngineError::network(format!("Too many redirects: {}", err))
        } else if err.is_decode() {
            EngineError::parsing(format!("Response decode error: {}", err))
        } else {
            EngineError::internal(format!("HTTP client error: {}", err))
        };

        let context = match err.url() {
            Some(url) => context.endpoint(url.as_str()),
            None => context,
        };

        if let Some(status) = err.status() {
            engine_error.with_context(context.status_code(status.as_u16()))
        } else {
            engine_error.with_context(context)
        }
    }
}

/// Convert serde_json errors to EngineError
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::parsing(format!("JSON error: {}", err))
            .with_context(ErrorContext::for_service("json"))
    }
}
