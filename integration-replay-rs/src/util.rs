//! Utility module for common functionality

use once_cell::sync::Lazy;
use regex::Regex;
use url::{form_urlencoded, Url};

/// Truncate a string to a maximum length, adding ellipsis if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer [A-Za-z0-9\-_\.=]+", "Bearer [REDACTED]"),
        (r"Basic [A-Za-z0-9+/=]+", "Basic [REDACTED]"),
        (r#"(?i)"?(api[_-]?key|password|secret|token)"?\s*[=:]\s*"?[^\s&",}]+"?"#, "$1=[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Sanitize a string for logging (remove credential patterns)
pub fn sanitize_for_logging(s: &str) -> String {
    let mut result = s.to_string();
    for (re, replacement) in SENSITIVE_PATTERNS.iter() {
        result = re.replace_all(&result, *replacement).to_string();
    }
    result
}

/// Generate a unique request id
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Last non-empty path segment of a URL or path, ignoring any query string
///
/// `https://gw/ortho-prd/getApptSlots?x=1` and `/ortho-prd/getApptSlots/`
/// both yield `getApptSlots`.
pub fn last_path_segment(endpoint: &str) -> Option<String> {
    let path = match Url::parse(endpoint) {
        Ok(url) => url.path().to_string(),
        Err(_) => endpoint
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Percent-encode an untrusted value so it stays a single URL path segment
///
/// Returns `None` for values that would be dropped or collapsed by URL
/// normalization (empty, `.` and `..`).
pub fn encode_path_segment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }
    let encoded: String = form_urlencoded::byte_serialize(trimmed.as_bytes()).collect();
    // byte_serialize writes spaces as '+' and literal '+' as %2B
    Some(encoded.replace('+', "%20"))
}

/// Join a base URL and a path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
