//! Conversation replay
//!
//! Re-sends the user turns of a captured conversation to a chat prediction
//! endpoint, one at a time, under a single session id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::mapping::extract_message;
use crate::util::generate_request_id;

/// Pause between consecutive turns
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_secs(2);

/// Outcome of one re-sent turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub index: usize,
    pub message: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    /// Reply text, when the endpoint returned one
    pub reply: Option<String>,
    pub raw: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTranscript {
    pub session_id: String,
    pub turns: Vec<TurnOutcome>,
}

impl ConversationTranscript {
    pub fn failed_turns(&self) -> usize {
        self.turns.iter().filter(|t| !t.ok).count()
    }
}

/// Replays user turns against a prediction endpoint
pub struct ConversationReplayer {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    authorization: Option<String>,
    delay: Duration,
}

impl ConversationReplayer {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            authorization: None,
            delay: DEFAULT_TURN_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Send every turn in order; a failed turn does not stop the run
    pub async fn replay(&self, session_id: Option<String>, messages: &[String]) -> ConversationTranscript {
        let session_id = session_id.unwrap_or_else(generate_request_id);
        let mut turns = Vec::with_capacity(messages.len());

        for (index, message) in messages.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let turn = self.send_turn(index, message, &session_id).await;
            if let Some(error) = &turn.error {
                warn!(session_id = %session_id, index, error = %error, "conversation turn failed");
            }
            turns.push(turn);
        }

        let transcript = ConversationTranscript { session_id, turns };
        info!(
            session_id = %transcript.session_id,
            turns = transcript.turns.len(),
            failed = transcript.failed_turns(),
            "conversation replay finished"
        );
        transcript
    }

    async fn send_turn(&self, index: usize, message: &str, session_id: &str) -> TurnOutcome {
        let payload = json!({
            "question": message,
            "overrideConfig": { "sessionId": session_id },
        });
        let mut request = HttpRequest::new(HttpMethod::Post, self.endpoint.as_str()).json_body(payload.to_string());
        if let Some(auth) = &self.authorization {
            request = request.header("Authorization", auth.clone());
        }

        let started = Instant::now();
        let result = self.transport.send(request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut outcome = TurnOutcome {
            index,
            message: message.to_string(),
            ok: false,
            status: None,
            latency_ms,
            reply: None,
            raw: Value::Null,
            error: None,
        };

        match result {
            Err(e) => outcome.error = Some(e.to_string()),
            Ok(response) => {
                let raw: Value =
                    serde_json::from_str(&response.body).unwrap_or_else(|_| Value::String(response.body.clone()));
                outcome.status = Some(response.status);
                outcome.ok = response.is_success();
                outcome.reply = match &raw {
                    Value::String(text) => Some(text.clone()),
                    other => other.get("text").and_then(Value::as_str).map(str::to_string),
                };
                if !outcome.ok {
                    outcome.error = Some(format!(
                        "HTTP {} {}: {}",
                        response.status,
                        response.status_text,
                        extract_message(&raw).unwrap_or_default()
                    ));
                }
                outcome.raw = raw;
            }
        }
        outcome
    }
}
