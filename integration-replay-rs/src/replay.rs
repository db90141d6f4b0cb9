//! Replay orchestrator
//!
//! Re-executes one captured tool call:
//! normalize → select registry → look up action → validate → build body →
//! execute (single call or tiered search) → classify → respond.
//!
//! Every step appends to a decision trace that is returned with the
//! response and attached to any error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::classify::classify_response;
use crate::config::{EngineConfig, TenantConfig};
use crate::core::{Clock, HttpMethod, HttpTransport, ReqwestTransport, SystemClock};
use crate::dates::{DateRangeCorrector, DateRangePolicy};
use crate::error::mapping::{extract_message, map_http_error};
use crate::error::{EngineError, ErrorContext, Result};
use crate::execution::{Executor, MockMap};
use crate::harness::Observation;
use crate::normalize::{normalize_params, removed_keys, Params};
use crate::registry::{registry_for, ActionConfig, BuildContext, ToolName, Validation};
use crate::search::{ExpansionSearch, SearchState, TierAttempt};
use crate::util::join_url;

/// A tool call to re-execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    pub tool_name: String,
    pub action: String,
    #[serde(default)]
    pub input: Params,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub observation_id: Option<String>,
    /// Overrides the tenant's correlation token
    #[serde(default)]
    pub correlation_token: Option<String>,
}

impl ReplayRequest {
    pub fn new(tool_name: impl Into<String>, action: impl Into<String>, input: Params) -> Self {
        Self {
            tool_name: tool_name.into(),
            action: action.into(),
            input,
            tenant_id: None,
            observation_id: None,
            correlation_token: None,
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Request for a captured observation; the action is read from its input
    pub fn from_observation(observation: &Observation) -> Result<Self> {
        let mut input = match &observation.input {
            Value::Object(map) => map.clone(),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(EngineError::validation(format!(
                        "observation '{}' input is not a JSON object",
                        observation.id
                    )))
                }
            },
            _ => {
                return Err(EngineError::validation(format!(
                    "observation '{}' has no input object",
                    observation.id
                )))
            }
        };

        let action = match input.remove("action") {
            Some(Value::String(action)) if !action.trim().is_empty() => action,
            _ => {
                return Err(EngineError::validation(format!(
                    "observation '{}' input does not name an action",
                    observation.id
                )))
            }
        };

        Ok(Self {
            tool_name: observation.name.clone(),
            action,
            input,
            tenant_id: None,
            observation_id: Some(observation.id.clone()),
            correlation_token: None,
        })
    }
}

/// Execution path a replay took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Live,
    Mock,
}

/// Search details attached to search-action replays
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub found: bool,
    pub tiers_attempted: usize,
    pub attempts: Vec<TierAttempt>,
}

/// Result of a replay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub success: bool,
    pub tool_name: String,
    pub action: String,
    pub tenant_id: String,
    pub mode: ReplayMode,
    /// Endpoint of the last call made; absent when validation short-circuited
    pub endpoint: Option<String>,
    pub method: HttpMethod,
    pub request_body: Option<Value>,
    pub response: Value,
    pub status: Option<u16>,
    pub message: String,
    pub pre_call_logs: Vec<String>,
    pub duration_ms: u64,
    pub observation_id: Option<String>,
    pub cached: bool,
    pub search: Option<SearchSummary>,
}

/// Re-executes captured tool calls against live or captured upstreams
pub struct ReplayEngine {
    config: EngineConfig,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    info_cache: Option<Arc<TtlCache<Value>>>,
}

impl ReplayEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
            info_cache: None,
        }
    }

    /// Engine with a reqwest transport honouring the configured timeout
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(config.timeout_seconds))?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serve repeated read-only lookups from a cache
    pub fn with_info_cache(mut self, cache: Arc<TtlCache<Value>>) -> Self {
        self.info_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replay against the live upstream
    pub async fn execute_replay(&self, request: &ReplayRequest) -> Result<ReplayResponse> {
        self.run(request, None).await
    }

    /// Replay against captured responses; never touches the network
    pub async fn execute_mock_replay(&self, request: &ReplayRequest, mock_map: &MockMap) -> Result<ReplayResponse> {
        self.run(request, Some(mock_map)).await
    }

    async fn run(&self, request: &ReplayRequest, mock_map: Option<&MockMap>) -> Result<ReplayResponse> {
        let started = Instant::now();
        let mut logs = Vec::new();

        match self.run_steps(request, mock_map, &mut logs).await {
            Ok(mut response) => {
                response.duration_ms = started.elapsed().as_millis() as u64;
                response.pre_call_logs = logs;
                info!(
                    tool = %response.tool_name,
                    action = %response.action,
                    tenant = %response.tenant_id,
                    success = response.success,
                    duration_ms = response.duration_ms,
                    "replay finished"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    tool = %request.tool_name,
                    action = %request.action,
                    error = %e,
                    "replay failed"
                );
                let mut context = ErrorContext::for_service("replay")
                    .pre_call_logs(&logs)
                    .with("tool", &request.tool_name)
                    .with("action", &request.action);
                if let Some(status) = e.status_code() {
                    context = context.status_code(status);
                }
                Err(e.with_context(context))
            }
        }
    }

    async fn run_steps(
        &self,
        request: &ReplayRequest,
        mock_map: Option<&MockMap>,
        logs: &mut Vec<String>,
    ) -> Result<ReplayResponse> {
        let mode = if mock_map.is_some() { ReplayMode::Mock } else { ReplayMode::Live };
        logs.push(format!(
            "[Request] tool={} action={} tenant={} mode={:?}",
            request.tool_name,
            request.action,
            request.tenant_id.as_deref().unwrap_or(&self.config.default_tenant),
            mode
        ));

        let removed = removed_keys(&request.input);
        let params = normalize_params(&request.input);
        if removed.is_empty() {
            logs.push("[Normalize] No placeholder parameters".to_string());
        } else {
            logs.push(format!(
                "[Normalize] Removed {} placeholder parameter(s): {}",
                removed.len(),
                removed.join(", ")
            ));
        }

        let tenant = self.config.tenant(request.tenant_id.as_deref())?;
        let registry = registry_for(tenant.kind);
        logs.push(format!("[Registry] {:?} registry for tenant '{}'", registry.kind, tenant.id));

        let tool = ToolName::parse(&request.tool_name)?;
        let action = registry.lookup(tool, &request.action)?;
        logs.push(format!(
            "[Registry] {}.{} → {:?} {}",
            tool, action.name, action.endpoint, action.method
        ));

        let token = match &request.correlation_token {
            Some(token) if !token.trim().is_empty() => {
                logs.push("[Correlation] Using caller-supplied token".to_string());
                token.clone()
            }
            _ => {
                logs.push("[Correlation] Using tenant token".to_string());
                tenant.correlation_token.clone()
            }
        };
        let ctx = BuildContext {
            correlation_token: &token,
            tenant,
        };

        let base = ReplayResponse {
            success: false,
            tool_name: tool.to_string(),
            action: action.name.to_string(),
            tenant_id: tenant.id.clone(),
            mode,
            endpoint: None,
            method: action.method,
            request_body: None,
            response: Value::Null,
            status: None,
            message: String::new(),
            pre_call_logs: Vec::new(),
            duration_ms: 0,
            observation_id: request.observation_id.clone(),
            cached: false,
            search: None,
        };

        match (action.validate)(&params, &ctx) {
            Ok(Validation::Valid) => logs.push("[Validation] Passed".to_string()),
            Ok(Validation::Guided(payload)) => {
                logs.push("[Validation] Missing fields; returning guidance without calling upstream".to_string());
                let message = extract_message(&payload).unwrap_or_default();
                return Ok(ReplayResponse {
                    response: payload,
                    message,
                    ..base
                });
            }
            Err(e) => {
                logs.push(format!("[Validation] Failed: {}", e));
                return Err(e);
            }
        }

        let executor = Executor::new(self.transport.clone(), tenant.authorization_header());

        if action.search {
            self.run_search(action, &ctx, &executor, &params, mock_map, logs, base).await
        } else {
            self.run_single(action, &ctx, &executor, &params, mock_map, logs, base).await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_single(
        &self,
        action: &ActionConfig,
        ctx: &BuildContext<'_>,
        executor: &Executor,
        params: &Params,
        mock_map: Option<&MockMap>,
        logs: &mut Vec<String>,
        base: ReplayResponse,
    ) -> Result<ReplayResponse> {
        let path = action.endpoint.resolve(params, ctx)?;
        let endpoint = join_url(&ctx.tenant.base_url, &path);
        let body = (action.build_body)(params, ctx);
        logs.push(format!("[Endpoint] {} {}", action.method, endpoint));

        let cache_key = match (&self.info_cache, mock_map) {
            (Some(_), None) if action.cacheable => Some(format!(
                "{}:{}:{}:{}",
                ctx.tenant.id,
                base.tool_name,
                endpoint,
                serde_json::to_string(&body)?
            )),
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.info_cache, &cache_key) {
            if let Some(cached) = cache.get(key) {
                logs.push("[Cache] Serving cached response".to_string());
                return Ok(ReplayResponse {
                    success: true,
                    endpoint: Some(endpoint),
                    request_body: Some(body),
                    response: cached,
                    message: action.success_label.to_string(),
                    cached: true,
                    ..base
                });
            }
        }

        let outcome = executor.execute(&endpoint, action.method, &body, logs, mock_map).await?;

        if !outcome.ok {
            let mut context = ErrorContext::for_service("replay").endpoint(endpoint.as_str());
            let error = map_http_error(outcome.status, &outcome.status_text, &outcome.data, &mut context);
            logs.push(format!("[Result] {}", error));
            return Err(error.with_context(context));
        }

        if let Some(classified) = classify_response(&outcome.data) {
            logs.push(format!("[Classify] Rule '{}' matched: {}", classified.rule, classified.message));
            return Err(EngineError::upstream_rejected(classified.message).with_context(
                ErrorContext::for_service("replay")
                    .endpoint(endpoint.as_str())
                    .status_code(outcome.status)
                    .error_code(classified.rule),
            ));
        }
        logs.push("[Classify] No error shape detected".to_string());

        if let (Some(cache), Some(key)) = (&self.info_cache, cache_key) {
            cache.set(key, outcome.data.clone());
        }

        logs.push(format!("[Result] {}", action.success_label));
        Ok(ReplayResponse {
            success: true,
            endpoint: Some(endpoint),
            request_body: Some(body),
            response: outcome.data,
            status: Some(outcome.status),
            message: action.success_label.to_string(),
            ..base
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_search(
        &self,
        action: &ActionConfig,
        ctx: &BuildContext<'_>,
        executor: &Executor,
        params: &Params,
        mock_map: Option<&MockMap>,
        logs: &mut Vec<String>,
        base: ReplayResponse,
    ) -> Result<ReplayResponse> {
        let tenant: &TenantConfig = ctx.tenant;
        let corrector = DateRangeCorrector::new(
            DateRangePolicy::for_tenant(&self.config, tenant),
            self.clock.today(),
            tenant.date_format.clone(),
        );

        let search = ExpansionSearch {
            executor,
            action,
            ctx,
            corrector: &corrector,
            tiers: &tenant.expansion_tiers,
            mock_map,
        };
        let outcome = search.run(params, logs).await?;

        let found = outcome.state == SearchState::Found;
        let message = if found {
            action.success_label.to_string()
        } else {
            extract_message(&outcome.response).unwrap_or_default()
        };
        logs.push(format!("[Result] {}", message));

        Ok(ReplayResponse {
            success: found,
            endpoint: Some(outcome.endpoint),
            request_body: Some(outcome.request_body),
            response: outcome.response,
            status: outcome.status,
            message,
            search: Some(SearchSummary {
                found,
                tiers_attempted: outcome.attempts.len(),
                attempts: outcome.attempts,
            }),
            ..base
        })
    }
}
