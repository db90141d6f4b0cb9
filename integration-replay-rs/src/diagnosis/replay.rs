//! Stage 3: replay the original request
//!
//! Re-issues the logged request verbatim. A successful replay points to a
//! transient failure; a replay that fails the same way points to a
//! persistent one.

use std::time::Instant;

use serde_json::Value;
use tracing::info;

use super::categorize::categorize;
use super::{ErrorCategory, OrderLogRow, ReplayOutcome};
use crate::classify::classify_response;
use crate::core::{HttpMethod, HttpRequest, HttpTransport, RawResponse};
use crate::error::mapping::extract_message;
use crate::util::{join_url, truncate_string};

/// Send a request body to the ordering service
pub(crate) async fn send_order_request(
    transport: &dyn HttpTransport,
    row: &OrderLogRow,
    base_url: &str,
    body: &Value,
) -> crate::error::Result<RawResponse> {
    let method = HttpMethod::parse(&row.method).unwrap_or(HttpMethod::Post);
    let url = join_url(base_url, &row.endpoint);
    let mut request = HttpRequest::new(method, url).header("Accept", "application/json");
    if method.has_body() && !body.is_null() {
        request = request.json_body(serde_json::to_string(body)?);
    }
    transport.send(request).await
}

/// Decoded body plus an error message when the response is a failure
pub(crate) fn evaluate_response(response: &RawResponse) -> (Value, Option<String>) {
    let body: Value = serde_json::from_str(&response.body).unwrap_or_else(|_| Value::String(response.body.clone()));

    if !response.is_success() {
        let message = extract_message(&body).unwrap_or_else(|| truncate_string(&response.body, 200));
        return (body, Some(format!("HTTP {} {}: {}", response.status, response.status_text, message)));
    }
    let error = classify_response(&body).map(|classified| classified.message);
    (body, error)
}

/// Replay the logged request against the live service
pub async fn replay_original(
    transport: &dyn HttpTransport,
    row: &OrderLogRow,
    base_url: &str,
    category: ErrorCategory,
) -> ReplayOutcome {
    if row.request_body.is_null() {
        return ReplayOutcome::skipped("log row has no request body to replay");
    }

    let started = Instant::now();
    let result = send_order_request(transport, row, base_url, &row.request_body).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let outcome = match result {
        Err(e) => {
            let error = e.to_string();
            ReplayOutcome {
                attempted: true,
                duration_ms,
                same_failure: category == ErrorCategory::Timeout && matches!(e.root(), crate::error::EngineError::Timeout(_)),
                error: Some(error),
                ..ReplayOutcome::default()
            }
        }
        Ok(response) => {
            let (body, error) = evaluate_response(&response);
            let same_failure = match &error {
                None => false,
                Some(message) => {
                    let replayed = OrderLogRow {
                        error_message: Some(message.clone()),
                        error_stack: None,
                        response_body: body,
                        status_code: Some(response.status),
                        ..row.clone()
                    };
                    categorize(&replayed).category == category
                }
            };
            ReplayOutcome {
                attempted: true,
                skipped_reason: None,
                status_code: Some(response.status),
                duration_ms,
                succeeded: error.is_none(),
                same_failure,
                error,
            }
        }
    };

    info!(
        log_id = %row.id,
        succeeded = outcome.succeeded,
        same_failure = outcome.same_failure,
        duration_ms,
        "replayed original order request"
    );
    outcome
}
