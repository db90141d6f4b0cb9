//! Execution layer
//!
//! Issues one request either against the live upstream or against a map of
//! captured responses. Mock mode never touches the network.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::Result;
use crate::util::{last_path_segment, sanitize_for_logging, truncate_string};

/// Captured responses keyed by endpoint identifier (last path segment)
pub type MockMap = BTreeMap<String, Value>;

/// Body preview length in the decision trace
const LOG_BODY_LIMIT: usize = 500;

/// Outcome of one upstream call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOutcome {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    /// Decoded body; raw text when it is not JSON
    pub data: Value,
}

/// Key under which a captured response for `endpoint` is stored
pub fn mock_key(endpoint: &str) -> String {
    last_path_segment(endpoint).unwrap_or_else(|| endpoint.to_string())
}

/// Sends requests for the replay engine
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn HttpTransport>,
    authorization: Option<String>,
}

impl Executor {
    pub fn new(transport: Arc<dyn HttpTransport>, authorization: Option<String>) -> Self {
        Self {
            transport,
            authorization,
        }
    }

    /// Execute one call, appending to the decision trace
    ///
    /// Transport failures (timeouts, refused connections) are returned as
    /// errors. Non-2xx statuses are returned as outcomes with `ok == false`.
    pub async fn execute(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: &Value,
        logs: &mut Vec<String>,
        mock_map: Option<&MockMap>,
    ) -> Result<HttpOutcome> {
        match mock_map {
            Some(map) => Ok(self.execute_mock(endpoint, method, map, logs)),
            None => self.execute_live(endpoint, method, body, logs).await,
        }
    }

    fn execute_mock(&self, endpoint: &str, method: HttpMethod, map: &MockMap, logs: &mut Vec<String>) -> HttpOutcome {
        let key = mock_key(endpoint);
        logs.push(format!("[Mock] {} {} resolved to key '{}'", method, endpoint, key));

        match map.get(&key) {
            Some(captured) => {
                logs.push(format!("[Mock] Serving captured response for '{}'", key));
                HttpOutcome {
                    ok: true,
                    status: 200,
                    status_text: "OK".to_string(),
                    data: captured.clone(),
                }
            }
            None => {
                logs.push(format!(
                    "[Mock] No captured response for '{}' (available: {})",
                    key,
                    map.keys().cloned().collect::<Vec<_>>().join(", ")
                ));
                HttpOutcome {
                    ok: false,
                    status: 404,
                    status_text: "Not Found".to_string(),
                    data: json!({
                        "error": format!("No captured response for key '{}'", key),
                        "availableKeys": map.keys().collect::<Vec<_>>(),
                    }),
                }
            }
        }
    }

    async fn execute_live(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: &Value,
        logs: &mut Vec<String>,
    ) -> Result<HttpOutcome> {
        let mut request = HttpRequest::new(method, endpoint).header("Accept", "application/json");
        if let Some(auth) = &self.authorization {
            request = request.header("Authorization", auth.clone());
        }

        logs.push(format!("[HTTP] {} {}", method, endpoint));
        if method.has_body() && !body.is_null() {
            let serialized = serde_json::to_string(body)?;
            logs.push(format!(
                "[HTTP] Body: {}",
                truncate_string(&sanitize_for_logging(&serialized), LOG_BODY_LIMIT)
            ));
            request = request.json_body(serialized);
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                logs.push(format!("[HTTP] Request failed: {}", e));
                return Err(e);
            }
        };

        logs.push(format!("[HTTP] Response: {} {}", response.status, response.status_text));
        debug!(endpoint, status = response.status, "replay call completed");

        let data = if response.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&response.body).unwrap_or_else(|_| Value::String(response.body.clone()))
        };

        Ok(HttpOutcome {
            ok: response.is_success(),
            status: response.status,
            status_text: response.status_text,
            data,
        })
    }
}
