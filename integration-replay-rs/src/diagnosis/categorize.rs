//! Stage 1: categorize
//!
//! Ordered pattern rules over the stored error text. The first rule with a
//! matching pattern wins; nothing matching means `Other` at 50.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{ErrorCategory, OrderLogRow};
use crate::util::truncate_string;

/// Category assigned to a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch {
    pub category: ErrorCategory,
    pub confidence: u8,
    pub evidence: String,
}

struct CategoryRule {
    category: ErrorCategory,
    confidence: u8,
    patterns: Vec<Regex>,
    /// Status codes that match on their own
    statuses: &'static [u16],
}

fn rule(category: ErrorCategory, confidence: u8, statuses: &'static [u16], patterns: &[&str]) -> CategoryRule {
    CategoryRule {
        category,
        confidence,
        patterns: patterns.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        statuses,
    }
}

static RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    vec![
        rule(ErrorCategory::Timeout, 90, &[408, 504], &[
            r"(?i)timed?[ -]?out",
            r"(?i)ETIMEDOUT|ESOCKETTIMEDOUT|ECONNABORTED",
            r"(?i)deadline exceeded",
        ]),
        rule(ErrorCategory::StoreUnavailable, 90, &[], &[
            r"(?i)store\s+(is\s+)?(currently\s+)?(closed|offline|unavailable)",
            r"(?i)not\s+accepting\s+(online\s+)?orders",
            r#"(?i)"?is(Open|Online)"?\s*:\s*false"#,
        ]),
        rule(ErrorCategory::InvalidDiscountCode, 90, &[], &[
            r"(?i)(coupon|promo|discount)(\s+code)?\s+(is\s+)?(invalid|expired|not\s+found|inactive|not\s+valid)",
            r"(?i)invalid\s+(coupon|promo|discount)",
        ]),
        rule(ErrorCategory::InvalidItem, 85, &[], &[
            r"(?i)(menu\s+item|item|product)\b.{0,40}(not\s+found|unavailable|not\s+available|invalid|out\s+of\s+stock)",
            r"(?i)(invalid|unknown)\s+(item|product)(\s+code)?",
        ]),
        rule(ErrorCategory::UnsupportedFulfillmentMethod, 85, &[], &[
            r"(?i)(service\s+method|fulfil?lment|delivery|carry-?out|pick-?up).{0,40}(not\s+supported|unsupported|not\s+available|not\s+offered)",
            r"(?i)unsupported\s+(service|fulfil?lment)\s+method",
        ]),
        rule(ErrorCategory::AddressError, 80, &[], &[
            r"(?i)(invalid|unknown|unrecognized)\s+address",
            r"(?i)(zip|postal)\s*code",
            r"(?i)outside\s+(of\s+)?(the\s+)?delivery\s+(area|zone)",
            r"(?i)geocod",
        ]),
        rule(ErrorCategory::InternalDefect, 75, &[500], &[
            r"TypeError|ReferenceError|NullPointerException",
            r"(?i)cannot\s+read\s+propert",
            r"(?i)undefined\s+is\s+not",
            r"(?i)internal\s+server\s+error",
        ]),
        rule(ErrorCategory::InputValidation, 70, &[400, 422], &[
            r"(?i)validation\s+(error|failed)",
            r"(?i)\bis\s+required\b|required\s+field",
            r"(?i)invalid\s+(request|payload|format|input)",
        ]),
    ]
});

fn sources(row: &OrderLogRow) -> Vec<(&'static str, String)> {
    let mut sources = Vec::new();
    if let Some(message) = &row.error_message {
        sources.push(("error message", message.clone()));
    }
    if let Some(stack) = &row.error_stack {
        sources.push(("error stack", stack.clone()));
    }
    match &row.response_body {
        Value::Null => {}
        Value::String(s) => sources.push(("response body", s.clone())),
        other => sources.push(("response body", other.to_string())),
    }
    sources
}

/// Assign a category to a failed row
pub fn categorize(row: &OrderLogRow) -> CategoryMatch {
    let sources = sources(row);

    for rule in RULES.iter() {
        for (label, text) in &sources {
            if let Some(found) = rule.patterns.iter().find_map(|re| re.find(text)) {
                return CategoryMatch {
                    category: rule.category,
                    confidence: rule.confidence,
                    evidence: format!("matched \"{}\" in {}", truncate_string(found.as_str(), 80), label),
                };
            }
        }
    }

    // Status codes only decide once no rule's text matched anywhere
    if let Some(status) = row.status_code {
        if let Some(rule) = RULES.iter().find(|rule| rule.statuses.contains(&status)) {
            return CategoryMatch {
                category: rule.category,
                confidence: rule.confidence.saturating_sub(10),
                evidence: format!("HTTP status {}", status),
            };
        }
    }

    CategoryMatch {
        category: ErrorCategory::Other,
        confidence: 50,
        evidence: "no category rule matched".to_string(),
    }
}
