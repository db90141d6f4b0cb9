//! Failure monitor
//!
//! Polls the order log for recent failures and diagnoses each one once.
//! Only ids inside the latest scan window are remembered, so a failure that
//! drops out of the window and later reappears is diagnosed again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::{DiagnoseOptions, Diagnoser, DiagnosisResult, OrderLogStore};
use crate::error::Result;

/// Diagnoses new failures as they appear in the log
pub struct FailureMonitor {
    store: Arc<dyn OrderLogStore>,
    diagnoser: Arc<dyn Diagnoser>,
    base_url: String,
    options: DiagnoseOptions,
    seen: Mutex<HashSet<String>>,
    diagnosed: AtomicUsize,
}

impl FailureMonitor {
    pub fn new(
        store: Arc<dyn OrderLogStore>,
        diagnoser: Arc<dyn Diagnoser>,
        base_url: impl Into<String>,
        options: DiagnoseOptions,
    ) -> Self {
        Self {
            store,
            diagnoser,
            base_url: base_url.into(),
            options,
            seen: Mutex::new(HashSet::new()),
            diagnosed: AtomicUsize::new(0),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Diagnose up to `limit` recent failures not seen before, one at a time
    pub async fn scan(&self, limit: usize) -> Result<Vec<DiagnosisResult>> {
        let rows = self.store.recent_failures(limit).await?;
        let window: HashSet<String> = rows.iter().map(|row| row.id.clone()).collect();
        let mut results = Vec::new();

        for row in rows {
            if row.success {
                continue;
            }
            let is_new = self.seen().insert(row.id.clone());
            if !is_new {
                debug!(log_id = %row.id, "already diagnosed");
                continue;
            }
            results.push(self.diagnoser.diagnose(&row, &self.base_url, self.options).await);
            self.diagnosed.fetch_add(1, Ordering::Relaxed);
        }

        let tracked = {
            let mut seen = self.seen();
            seen.retain(|id| window.contains(id));
            seen.len()
        };

        info!(diagnosed = results.len(), tracked, "failure monitor scan finished");
        Ok(results)
    }

    /// Number of rows diagnosed so far
    pub fn diagnosed_count(&self) -> usize {
        self.diagnosed.load(Ordering::Relaxed)
    }

    /// Number of ids remembered from the latest scan window
    pub fn tracked_count(&self) -> usize {
        self.seen().len()
    }
}
