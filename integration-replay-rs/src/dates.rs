//! Date-range correction for slot searches
//!
//! Agent-supplied dates may be malformed, in the past, or implausibly far
//! out. The corrector repairs them so that:
//! - `end - start >= min_range_days`
//! - `start >= max(today, sandbox_floor)`
//! - dates beyond `today + max_future_days` are discarded, not clamped
//! - a computed end never passes that horizon; the start moves back
//!   instead when the window would get too narrow, but never below the floor

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, TenantConfig};

/// Bounds applied by the corrector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangePolicy {
    pub max_future_days: i64,
    pub min_range_days: i64,
    pub sandbox_floor: Option<NaiveDate>,
}

impl DateRangePolicy {
    /// Policy for one tenant under the engine-wide limits
    pub fn for_tenant(config: &EngineConfig, tenant: &TenantConfig) -> Self {
        Self {
            max_future_days: config.max_future_days,
            min_range_days: config.min_range_days,
            sandbox_floor: tenant.sandbox_floor,
        }
    }
}

/// A repaired date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub expansion_days: i64,
    pub was_corrected: bool,
}

impl DateRangeResult {
    /// Width of the window in days
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// Repairs caller-supplied date windows against a fixed "today"
#[derive(Debug, Clone)]
pub struct DateRangeCorrector {
    policy: DateRangePolicy,
    today: NaiveDate,
    format: String,
}

impl DateRangeCorrector {
    pub fn new(policy: DateRangePolicy, today: NaiveDate, format: impl Into<String>) -> Self {
        Self {
            policy,
            today,
            format: format.into(),
        }
    }

    /// Render a date in the upstream format
    pub fn format_date(&self, date: NaiveDate) -> String {
        date.format(&self.format).to_string()
    }

    fn parse(&self, label: &str, raw: Option<&str>, logs: &mut Vec<String>) -> Option<NaiveDate> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        match NaiveDate::parse_from_str(raw, &self.format) {
            Ok(date) => Some(date),
            Err(_) => {
                logs.push(format!(
                    "[DateCorrection] {} '{}' does not match {}; treating as absent",
                    label, raw, self.format
                ));
                None
            }
        }
    }

    /// Earliest permitted start date
    pub fn floor(&self) -> NaiveDate {
        match self.policy.sandbox_floor {
            Some(floor) if floor > self.today => floor,
            _ => self.today,
        }
    }

    /// Latest date accepted before a value is treated as hallucinated
    pub fn horizon(&self) -> NaiveDate {
        self.today + Duration::days(self.policy.max_future_days)
    }

    fn discard_far_future(&self, label: &str, date: Option<NaiveDate>, logs: &mut Vec<String>) -> Option<NaiveDate> {
        match date {
            Some(d) if d > self.horizon() => {
                logs.push(format!(
                    "[DateCorrection] {} {} is more than {} days out; discarded as implausible",
                    label,
                    self.format_date(d),
                    self.policy.max_future_days
                ));
                None
            }
            other => other,
        }
    }

    fn fit_to_horizon(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        floor: NaiveDate,
        logs: &mut Vec<String>,
    ) -> (NaiveDate, NaiveDate) {
        let horizon = self.horizon();
        if end <= horizon {
            return (start, end);
        }

        let min = Duration::days(self.policy.min_range_days);
        if horizon - start >= min {
            logs.push(format!(
                "[DateCorrection] endDate {} capped at horizon {}",
                self.format_date(end),
                self.format_date(horizon)
            ));
            return (start, horizon);
        }

        // A sandbox floor past the horizon still wins over the horizon
        let shifted = (horizon - min).max(floor);
        logs.push(format!(
            "[DateCorrection] Range {} to {} passes horizon {}; shifted to start {}",
            self.format_date(start),
            self.format_date(end),
            self.format_date(horizon),
            self.format_date(shifted)
        ));
        (shifted, shifted + min)
    }

    /// Correct a window for the given expansion width
    pub fn correct(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        expansion_days: i64,
        logs: &mut Vec<String>,
    ) -> DateRangeResult {
        let parsed_start = self.parse("startDate", start, logs);
        let parsed_end = self.parse("endDate", end, logs);

        let kept_start = self.discard_far_future("startDate", parsed_start, logs);
        let kept_end = self.discard_far_future("endDate", parsed_end, logs);

        let floor = self.floor();
        let start_date = match kept_start {
            Some(s) if s >= floor => s,
            Some(s) => {
                logs.push(format!(
                    "[DateCorrection] startDate {} is before {}; reset",
                    self.format_date(s),
                    self.format_date(floor)
                ));
                floor
            }
            None => floor,
        };

        let width = expansion_days.max(self.policy.min_range_days);
        let end_date = match kept_end {
            Some(e) if e > start_date && (e - start_date).num_days() >= self.policy.min_range_days => e,
            Some(e) => {
                logs.push(format!(
                    "[DateCorrection] endDate {} leaves less than {} days after {}; extended to {} days",
                    self.format_date(e),
                    self.policy.min_range_days,
                    self.format_date(start_date),
                    width
                ));
                start_date + Duration::days(width)
            }
            None => start_date + Duration::days(width),
        };

        let (start_date, end_date) = self.fit_to_horizon(start_date, end_date, floor, logs);

        let was_corrected = parsed_start != Some(start_date) || parsed_end != Some(end_date);

        logs.push(format!(
            "[DateCorrection] Range {} to {} ({} days){}",
            self.format_date(start_date),
            self.format_date(end_date),
            (end_date - start_date).num_days(),
            if was_corrected { ", corrected" } else { "" }
        ));

        DateRangeResult {
            start_date,
            end_date,
            expansion_days: width,
            was_corrected,
        }
    }
}
