//! Structured logging setup
//!
//! Installs a global `tracing` subscriber. The per-replay decision trace
//! (`pre_call_logs`) is returned to callers separately and never depends
//! on a subscriber being installed.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::{ConfigProvider, ConfigProviderExt};
use crate::error::{EngineError, Result};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,
    pub service_name: String,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "integration-replay".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Read `log_level`, `log_json` and `service_name`
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        let defaults = Self::default();
        Self {
            level: provider.get_string_or("log_level", &defaults.level),
            service_name: provider.get_string_or("service_name", &defaults.service_name),
            json_format: provider.get_bool_or("log_json", defaults.json_format),
        }
    }
}

/// Install the global subscriber; later calls are no-ops
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = Registry::default().with(filter);

    let installed = if config.json_format {
        let layer = fmt::layer().json().flatten_event(true).with_current_span(true).with_target(true);
        tracing::subscriber::set_global_default(registry.with(layer))
    } else {
        let layer = fmt::layer().with_target(true);
        tracing::subscriber::set_global_default(registry.with(layer))
    };

    if let Err(e) = installed {
        LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(EngineError::configuration(format!("Failed to set global subscriber: {}", e)));
    }

    tracing::info!(service = %config.service_name, json = config.json_format, "logging initialized");
    Ok(())
}
