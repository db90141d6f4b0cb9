//! # Integration Replay
//!
//! Reproduces and diagnoses the calls a scheduling/ordering agent made to
//! the practice and ordering APIs it integrates with.
//!
//! This crate provides:
//!
//! - A tool-call emulator that rebuilds the exact outbound request of a
//!   captured tool call and re-executes it live or against captured
//!   responses (`ReplayEngine`)
//! - Mock harnesses derived from captured traces (`generate_mock_harness`)
//! - A four-stage order-failure diagnosis pipeline (`DiagnosisPipeline`)
//! - A conversation replayer for multi-turn sessions
//!
//! ## Architecture
//!
//! - `HttpTransport`: the consumed HTTP primitive
//! - `ActionRegistry`: one closed action table per tenant kind
//! - `ExpansionSearch`: tiered date-window search for slot actions
//! - `Executor`: live/mock execution
//! - `classify_response`: ordered response-shape failure rules
//! - `EngineError`: the single error channel

pub mod cache;
pub mod classify;
pub mod config;
pub mod conversation;
pub mod core;
pub mod dates;
pub mod diagnosis;
pub mod error;
pub mod execution;
pub mod harness;
pub mod logging;
pub mod normalize;
pub mod registry;
pub mod replay;
pub mod search;
pub mod util;

pub use cache::TtlCache;
pub use classify::{classify_response, ClassifiedError};
pub use config::{ConfigProvider, EngineConfig, ServiceConfig, TenantConfig, TenantKind};
pub use conversation::{ConversationReplayer, ConversationTranscript};
pub use crate::core::{Clock, ClientBuilder, FixedClock, HttpTransport, ReqwestTransport, SystemClock};
pub use dates::{DateRangeCorrector, DateRangeResult};
pub use diagnosis::{
    DiagnoseOptions, Diagnoser, DiagnosisPipeline, DiagnosisResult, DiagnosisService, ErrorCategory,
    FailureMonitor, OrderLogRow, OrderLogStore,
};
pub use error::{EngineError, ErrorContext, Result};
pub use execution::{Executor, HttpOutcome, MockMap};
pub use harness::{generate_mock_harness, MockHarness, Observation, TraceStore};
pub use logging::{init_logging, LoggingConfig};
pub use registry::{registry_for, ActionConfig, ActionRegistry, ToolName};
pub use replay::{ReplayEngine, ReplayRequest, ReplayResponse};
pub use search::{ExpansionSearch, SearchState};

/// Create a replay engine from `REPLAY_*` environment variables
pub fn engine_from_env() -> Result<ReplayEngine> {
    ReplayEngine::from_config(EngineConfig::from_env()?)
}

#[cfg(test)]
mod tests;
