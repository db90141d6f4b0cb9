//! Order-failure diagnosis
//!
//! Four sequential stages run against one failed order log row:
//!
//! 1. `categorize`: pattern-match the stored error into an `ErrorCategory`
//! 2. `investigate`: check the request against live reference data
//! 3. `replay`: re-issue the original request to separate transient from
//!    persistent failures
//! 4. `fix`: mutate a copy of the request and test the mutation
//!
//! A stage that fails internally is recorded in the result; the pipeline
//! itself never aborts once it has a row.

pub mod categorize;
pub mod fix;
pub mod investigate;
pub mod monitor;
pub mod replay;
pub mod resolution;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::core::HttpTransport;
use crate::error::{EngineError, Result};

pub use categorize::{categorize, CategoryMatch};
pub use investigate::{HttpReferenceDataSource, ReferenceDataSource};
pub use monitor::FailureMonitor;

/// One row of the ordering service's request log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLogRow {
    pub id: String,
    pub success: bool,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_stack: Option<String>,
    #[serde(default)]
    pub request_body: Value,
    #[serde(default)]
    pub response_body: Value,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl OrderLogRow {
    /// Store id from the row, else from the request body
    pub fn store(&self) -> Option<String> {
        self.store_id.clone().or_else(|| {
            self.request_body
                .get("storeId")
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        })
    }
}

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    InvalidItem,
    InvalidDiscountCode,
    UnsupportedFulfillmentMethod,
    StoreUnavailable,
    Timeout,
    InternalDefect,
    InputValidation,
    AddressError,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidItem => "invalid-item",
            ErrorCategory::InvalidDiscountCode => "invalid-discount-code",
            ErrorCategory::UnsupportedFulfillmentMethod => "unsupported-fulfillment-method",
            ErrorCategory::StoreUnavailable => "store-unavailable",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::InternalDefect => "internal-defect",
            ErrorCategory::InputValidation => "input-validation",
            ErrorCategory::AddressError => "address-error",
            ErrorCategory::Other => "other",
        }
    }

    /// Whether stage 4 has an automated remedy for this category
    pub fn has_automated_fix(&self) -> bool {
        matches!(
            self,
            ErrorCategory::InvalidItem
                | ErrorCategory::InvalidDiscountCode
                | ErrorCategory::UnsupportedFulfillmentMethod
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single investigation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    pub fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// Kind of entity a problematic item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    MenuItem,
    DiscountCode,
    FulfillmentMethod,
}

/// Entity suspected of causing the failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicItem {
    pub kind: ItemKind,
    pub code: String,
    pub reason: String,
    /// At most three, drawn from the same catalog category
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investigation {
    pub checks: Vec<Check>,
    pub problematic_items: Vec<ProblematicItem>,
}

/// Stage 3 result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub attempted: bool,
    pub skipped_reason: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub succeeded: bool,
    /// Replay failed the same way as the original request
    pub same_failure: bool,
    pub error: Option<String>,
}

impl ReplayOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Stage 4 result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixProposal {
    pub description: String,
    pub changes: Vec<String>,
    pub modified_request: Value,
    pub tested: bool,
    pub resolved: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Caller switches for the optional stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseOptions {
    #[serde(default)]
    pub skip_replay: bool,
    #[serde(default)]
    pub skip_fix_test: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub log_id: String,
    pub category: ErrorCategory,
    /// 0-100
    pub confidence: u8,
    pub evidence: String,
    pub root_cause: String,
    pub investigation: Investigation,
    pub replay: ReplayOutcome,
    pub fix_proposal: Option<FixProposal>,
    pub resolution: Vec<String>,
    pub diagnosed_at: DateTime<Utc>,
}

/// Anything that can diagnose a failed row
#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose(&self, row: &OrderLogRow, base_url: &str, options: DiagnoseOptions) -> DiagnosisResult;
}

/// Read access to the ordering service's request log
#[async_trait]
pub trait OrderLogStore: Send + Sync {
    async fn get(&self, log_id: &str) -> Result<Option<OrderLogRow>>;

    /// Most recent failed rows, newest first
    async fn recent_failures(&self, limit: usize) -> Result<Vec<OrderLogRow>>;
}

/// The four-stage pipeline
pub struct DiagnosisPipeline {
    transport: Arc<dyn HttpTransport>,
    reference: Arc<dyn ReferenceDataSource>,
}

impl DiagnosisPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, reference: Arc<dyn ReferenceDataSource>) -> Self {
        Self { transport, reference }
    }

    /// Run every stage against a failed row
    pub async fn run(&self, row: &OrderLogRow, base_url: &str, options: DiagnoseOptions) -> DiagnosisResult {
        let matched = categorize(row);
        info!(
            log_id = %row.id,
            category = %matched.category,
            confidence = matched.confidence,
            "categorized order failure"
        );

        let investigation = investigate::investigate(matched.category, row, base_url, self.reference.as_ref()).await;

        let replay = if options.skip_replay {
            ReplayOutcome::skipped("replay disabled by caller")
        } else {
            replay::replay_original(self.transport.as_ref(), row, base_url, matched.category).await
        };

        let fix_proposal = if options.skip_fix_test {
            None
        } else {
            fix::fix_and_test(
                self.transport.as_ref(),
                row,
                base_url,
                matched.category,
                &investigation.problematic_items,
            )
            .await
        };

        let root_cause = root_cause(&matched, &investigation, &replay);
        let resolution =
            resolution::resolution_steps(matched.category, &investigation.problematic_items, fix_proposal.as_ref());

        DiagnosisResult {
            log_id: row.id.clone(),
            category: matched.category,
            confidence: matched.confidence,
            evidence: matched.evidence,
            root_cause,
            investigation,
            replay,
            fix_proposal,
            resolution,
            diagnosed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Diagnoser for DiagnosisPipeline {
    async fn diagnose(&self, row: &OrderLogRow, base_url: &str, options: DiagnoseOptions) -> DiagnosisResult {
        self.run(row, base_url, options).await
    }
}

fn root_cause(matched: &CategoryMatch, investigation: &Investigation, replay: &ReplayOutcome) -> String {
    let mut cause = if investigation.problematic_items.is_empty() {
        format!("{}: {}", matched.category, matched.evidence)
    } else {
        let reasons = investigation
            .problematic_items
            .iter()
            .map(|item| item.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        format!("{}: {}", matched.category, reasons)
    };

    if replay.attempted {
        if replay.succeeded {
            cause.push_str(" (replay succeeded; failure looks transient)");
        } else if replay.same_failure {
            cause.push_str(" (replay reproduced the failure)");
        }
    }
    cause
}

/// Caller-facing entry point: loads the row and guards the pipeline
pub struct DiagnosisService {
    store: Arc<dyn OrderLogStore>,
    diagnoser: Arc<dyn Diagnoser>,
}

impl DiagnosisService {
    pub fn new(store: Arc<dyn OrderLogStore>, diagnoser: Arc<dyn Diagnoser>) -> Self {
        Self { store, diagnoser }
    }

    /// Diagnose a row by id
    pub async fn diagnose_log(&self, log_id: &str, base_url: &str, options: DiagnoseOptions) -> Result<DiagnosisResult> {
        let row = self
            .store
            .get(log_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("order log '{}' not found", log_id)))?;
        self.diagnose_row(&row, base_url, options).await
    }

    /// Diagnose an already loaded row
    pub async fn diagnose_row(&self, row: &OrderLogRow, base_url: &str, options: DiagnoseOptions) -> Result<DiagnosisResult> {
        if row.success {
            return Err(EngineError::validation(format!(
                "order log '{}' records a successful request; nothing to diagnose",
                row.id
            )));
        }
        Ok(self.diagnoser.diagnose(row, base_url, options).await)
    }
}
