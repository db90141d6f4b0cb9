//! Shared fixtures for the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::{EngineConfig, TenantConfig, TenantKind};
use crate::core::{FixedClock, HttpRequest, HttpTransport, RawResponse, ReqwestTransport};
use crate::error::{EngineError, Result};
use crate::harness::{Observation, Session, TraceStore};
use crate::normalize::Params;
use crate::replay::ReplayEngine;

/// "Today" for every date-dependent test
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date")
}

pub fn legacy_tenant(base_url: &str) -> TenantConfig {
    let mut tenant = TenantConfig::new("ortho", TenantKind::Legacy, base_url);
    tenant.credential = "dXNlcjpwYXNz".to_string();
    tenant.correlation_token = "uui-test".to_string();
    tenant
}

pub fn rest_tenant(base_url: &str) -> TenantConfig {
    let mut tenant = TenantConfig::new("nex", TenantKind::Rest, base_url);
    tenant.credential = "rest-token".to_string();
    tenant.correlation_token = "corr-test".to_string();
    tenant.default_location_id = Some("loc-1".to_string());
    tenant
}

/// Engine over a real reqwest transport with a pinned clock
pub fn engine(config: EngineConfig) -> ReplayEngine {
    let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).expect("transport");
    ReplayEngine::new(config, Arc::new(transport)).with_clock(Arc::new(FixedClock(today())))
}

/// Engine over a transport that fails the test if it is ever called
pub fn offline_engine(config: EngineConfig) -> ReplayEngine {
    ReplayEngine::new(config, Arc::new(ScriptedTransport::default())).with_clock(Arc::new(FixedClock(today())))
}

pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// Transport answering from a queue and recording every request
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse>>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<RawResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn raw(status: u16, body: Value) -> Result<RawResponse> {
    Ok(RawResponse {
        status,
        status_text: crate::error::mapping::status_text(status),
        body: body.to_string(),
    })
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::internal("no scripted response left")))
    }
}

/// In-memory trace store
#[derive(Default)]
pub struct FakeTraceStore {
    pub traces: HashMap<String, Vec<Observation>>,
    pub sessions: HashMap<String, Session>,
}

impl FakeTraceStore {
    pub fn with_trace(mut self, trace_id: &str, observations: Vec<Observation>) -> Self {
        self.traces.insert(trace_id.to_string(), observations);
        self
    }
}

#[async_trait]
impl TraceStore for FakeTraceStore {
    async fn observations(&self, trace_id: &str) -> Result<Vec<Observation>> {
        Ok(self.traces.get(trace_id).cloned().unwrap_or_default())
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(session_id).cloned())
    }
}

pub fn observation(id: &str, name: &str, input: Value, output: Value, minute: u32) -> Observation {
    Observation {
        id: id.to_string(),
        name: name.to_string(),
        input,
        output,
        started_at: chrono::DateTime::parse_from_rfc3339(&format!("2025-03-03T10:{:02}:00Z", minute))
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc)),
    }
}
