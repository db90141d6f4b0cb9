//! Mock harness generation
//!
//! Turns the tool observations of one captured trace into a map of
//! endpoint identifier to captured output, so the trace can be replayed
//! through the mock execution path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::execution::{mock_key, MockMap};

/// Input keys that may name the endpoint a tool called
const ENDPOINT_KEYS: &[&str] = &["url", "endpoint", "path", "endpointUrl"];

/// Tool observations produced by the agent runtime itself rather than a tool
const RUNTIME_PREFIX: &str = "Runnable";

/// One tool call captured in a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Observation {
    /// Endpoint identifier named by the input, if any
    pub fn endpoint_key(&self) -> Option<String> {
        let input = self.input.as_object()?;
        ENDPOINT_KEYS
            .iter()
            .filter_map(|key| input.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
            .map(mock_key)
    }

    fn is_replayable(&self) -> bool {
        !self.name.starts_with(RUNTIME_PREFIX) && !self.output.is_null()
    }
}

/// A captured conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub trace_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Read access to captured traces
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Observations of a trace, in any order
    async fn observations(&self, trace_id: &str) -> Result<Vec<Observation>>;

    /// A session by id
    async fn session(&self, session_id: &str) -> Result<Option<Session>>;
}

/// Observation summary kept in the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessObservation {
    pub observation_id: String,
    pub name: String,
    pub input: Value,
    pub output: Value,
}

/// Captured outputs of one trace, ready for mock replay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockHarness {
    pub trace_id: String,
    pub observations: Vec<HarnessObservation>,
    pub mock_map: MockMap,
    /// Observations dropped as runtime-internal or output-less
    pub skipped: usize,
    pub created_at: DateTime<Utc>,
}

/// Build the mock map for a set of observations
///
/// Each output is stored under the observation name and under the endpoint
/// identifier its input names. Observations are applied in start order, so
/// a later capture for the same key replaces an earlier one.
pub fn build_mock_map(observations: &[Observation]) -> MockMap {
    let mut ordered: Vec<&Observation> = observations.iter().filter(|o| o.is_replayable()).collect();
    ordered.sort_by_key(|o| o.started_at);

    let mut map = MockMap::new();
    for observation in ordered {
        if let Some(previous) = map.insert(observation.name.clone(), observation.output.clone()) {
            if previous != observation.output {
                debug!(key = %observation.name, "later capture replaces earlier one");
            }
        }
        if let Some(key) = observation.endpoint_key() {
            if key != observation.name {
                map.insert(key, observation.output.clone());
            }
        }
    }
    map
}

/// Build a harness for one trace
pub async fn generate_mock_harness(store: &dyn TraceStore, trace_id: &str) -> Result<MockHarness> {
    let observations = store.observations(trace_id).await?;
    if observations.is_empty() {
        return Err(EngineError::not_found(format!("no observations for trace '{}'", trace_id)));
    }

    let (kept, skipped): (Vec<&Observation>, Vec<&Observation>) =
        observations.iter().partition(|o| o.is_replayable());

    let mock_map = build_mock_map(&observations);
    info!(
        trace_id,
        kept = kept.len(),
        skipped = skipped.len(),
        keys = mock_map.len(),
        "generated mock harness"
    );

    Ok(MockHarness {
        trace_id: trace_id.to_string(),
        observations: kept
            .into_iter()
            .map(|o| HarnessObservation {
                observation_id: o.id.clone(),
                name: o.name.clone(),
                input: o.input.clone(),
                output: o.output.clone(),
            })
            .collect(),
        mock_map,
        skipped: skipped.len(),
        created_at: Utc::now(),
    })
}

/// Build one harness per trace of a session
pub async fn generate_session_harnesses(store: &dyn TraceStore, session_id: &str) -> Result<Vec<MockHarness>> {
    let session = store
        .session(session_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("session '{}' not found", session_id)))?;

    let mut harnesses = Vec::with_capacity(session.trace_ids.len());
    for trace_id in &session.trace_ids {
        match generate_mock_harness(store, trace_id).await {
            Ok(harness) => harnesses.push(harness),
            Err(e) if matches!(e.root(), EngineError::NotFound(_)) => {
                debug!(trace_id = %trace_id, "trace has no observations; skipped");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(harnesses)
}
