//! Tiered slot search
//!
//! Availability searches widen their window through the tenant's tiers until
//! a tier returns at least one result. Exhausting every tier is not an
//! error; the caller receives a payload telling the agent to hand off.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::classify::classify_response;
use crate::dates::{DateRangeCorrector, DateRangeResult};
use crate::error::mapping::extract_message;
use crate::error::Result;
use crate::execution::{Executor, MockMap};
use crate::normalize::{param_str, Params};
use crate::registry::{ActionConfig, BuildContext};
use crate::util::join_url;

/// Array fields that carry search results
const RESULT_FIELDS: &[&str] = &["slots", "groups", "availableSlots", "records"];

/// Where the search stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Trying the tier at this index
    Tier(usize),
    Found,
    Exhausted,
}

/// Record of one tier attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAttempt {
    pub tier: usize,
    pub days: i64,
    pub range: DateRangeResult,
    pub status: Option<u16>,
    pub result_count: usize,
    pub error: Option<String>,
}

/// Final result of a tiered search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub state: SearchState,
    /// Annotated upstream body, or the exhaustion payload
    pub response: Value,
    /// Endpoint of the last call made
    pub endpoint: String,
    /// Body of the last call made
    pub request_body: Value,
    pub status: Option<u16>,
    pub attempts: Vec<TierAttempt>,
}

impl SearchOutcome {
    pub fn found(&self) -> bool {
        self.state == SearchState::Found
    }
}

/// Number of results carried by a search response
pub fn count_results(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        Value::Object(map) => {
            let direct = RESULT_FIELDS
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_array))
                .map(Vec::len)
                .sum::<usize>();
            if direct > 0 {
                return direct;
            }
            map.get("data").map(count_results).unwrap_or(0)
        }
        _ => 0,
    }
}

/// Runs one action through the tiers
pub struct ExpansionSearch<'a> {
    pub executor: &'a Executor,
    pub action: &'a ActionConfig,
    pub ctx: &'a BuildContext<'a>,
    pub corrector: &'a DateRangeCorrector,
    pub tiers: &'a [i64],
    pub mock_map: Option<&'a MockMap>,
}

impl ExpansionSearch<'_> {
    /// Run the search
    ///
    /// Only failures that would repeat on every tier (an unresolvable
    /// endpoint) are returned as errors.
    pub async fn run(&self, params: &Params, logs: &mut Vec<String>) -> Result<SearchOutcome> {
        let total = self.tiers.len();
        let caller_start = param_str(params, "startDate");
        let caller_end = param_str(params, "endDate");

        let mut attempts = Vec::with_capacity(total);
        let mut last_error: Option<String> = None;
        let mut endpoint = String::new();
        let mut request_body = Value::Null;
        let mut status = None;

        let mut state = if total == 0 { SearchState::Exhausted } else { SearchState::Tier(0) };

        while let SearchState::Tier(tier) = state {
            let days = self.tiers[tier];
            // Only the first tier honours the caller's end date
            let end_input = if tier == 0 { caller_end.as_deref() } else { None };
            let range = self.corrector.correct(caller_start.as_deref(), end_input, days, logs);

            let mut tier_params = params.clone();
            tier_params.insert("startDate".to_string(), Value::String(self.corrector.format_date(range.start_date)));
            tier_params.insert("endDate".to_string(), Value::String(self.corrector.format_date(range.end_date)));

            let path = self.action.endpoint.resolve(&tier_params, self.ctx)?;
            endpoint = join_url(&self.ctx.tenant.base_url, &path);
            request_body = (self.action.build_body)(&tier_params, self.ctx);

            logs.push(format!(
                "[Search] Tier {}/{}: {} days ({} to {})",
                tier + 1,
                total,
                range.expansion_days,
                self.corrector.format_date(range.start_date),
                self.corrector.format_date(range.end_date)
            ));

            let mut attempt = TierAttempt {
                tier,
                days,
                range,
                status: None,
                result_count: 0,
                error: None,
            };

            let found = match self
                .executor
                .execute(&endpoint, self.action.method, &request_body, logs, self.mock_map)
                .await
            {
                Err(e) => {
                    attempt.error = Some(e.to_string());
                    None
                }
                Ok(outcome) => {
                    attempt.status = Some(outcome.status);
                    status = Some(outcome.status);
                    if !outcome.ok {
                        let message = extract_message(&outcome.data).unwrap_or_else(|| outcome.data.to_string());
                        attempt.error = Some(format!("HTTP {} {}: {}", outcome.status, outcome.status_text, message));
                        None
                    } else if let Some(classified) = classify_response(&outcome.data) {
                        attempt.error = Some(classified.message);
                        None
                    } else {
                        attempt.result_count = count_results(&outcome.data);
                        (attempt.result_count > 0).then_some(outcome.data)
                    }
                }
            };

            match &attempt.error {
                Some(error) => {
                    logs.push(format!("[Search] Tier {} failed: {}", tier + 1, error));
                    last_error = Some(error.clone());
                }
                None if found.is_none() => logs.push(format!("[Search] Tier {} returned no results", tier + 1)),
                None => logs.push(format!(
                    "[Search] Tier {} found {} result(s)",
                    tier + 1,
                    attempt.result_count
                )),
            }
            attempts.push(attempt);

            if let Some(data) = found {
                let response = annotate_found(data, tier, &range, self.corrector);
                return Ok(SearchOutcome {
                    state: SearchState::Found,
                    response,
                    endpoint,
                    request_body,
                    status,
                    attempts,
                });
            }

            state = if tier + 1 < total { SearchState::Tier(tier + 1) } else { SearchState::Exhausted };
        }

        logs.push(format!("[Search] Exhausted {} tier(s) without availability", total));
        let response = exhausted_payload(&attempts, last_error.as_deref(), self.corrector);
        Ok(SearchOutcome {
            state,
            response,
            endpoint,
            request_body,
            status,
            attempts,
        })
    }
}

fn date_range_json(range: &DateRangeResult, corrector: &DateRangeCorrector) -> Value {
    json!({
        "startDate": corrector.format_date(range.start_date),
        "endDate": corrector.format_date(range.end_date),
    })
}

fn annotate_found(data: Value, tier: usize, range: &DateRangeResult, corrector: &DateRangeCorrector) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("results".to_string(), other);
            wrapped
        }
    };
    map.insert("expansionTier".to_string(), Value::from(tier));
    map.insert("expansionDays".to_string(), Value::from(range.expansion_days));
    map.insert("dateRange".to_string(), date_range_json(range, corrector));
    map.insert("searchExpanded".to_string(), Value::Bool(tier > 0));
    Value::Object(map)
}

fn exhausted_payload(attempts: &[TierAttempt], last_error: Option<&str>, corrector: &DateRangeCorrector) -> Value {
    let widest = attempts.iter().map(|a| a.range.expansion_days).max().unwrap_or(0);
    let last_range = attempts.last().map(|a| date_range_json(&a.range, corrector));
    json!({
        "success": false,
        "slots": [],
        "searchExpanded": true,
        "tiersAttempted": attempts.len(),
        "dateRange": last_range,
        "lastError": last_error,
        "message": format!("No availability found within {} days", widest),
        "action_required": "transfer to human agent",
        "llm_guidance": {
            "action": "transfer_to_agent",
            "instruction": "Tell the caller no openings were found in the searched window and offer to transfer them to a scheduling coordinator. Do not invent times.",
        }
    })
}
