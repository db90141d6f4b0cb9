//! Tests for parameter normalization

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::normalize::{first_param, is_empty_sentinel, normalize_params, param_str, removed_keys};
    use crate::tests::support::params;

    #[test]
    fn test_sentinels_are_detected_case_insensitively() {
        for value in ["NULL", "null", " None ", "N/A", "na", "undefined", "<REDACTED>", "[masked]", "***", ""] {
            assert!(is_empty_sentinel(&json!(value)), "{:?} should be a sentinel", value);
        }
        assert!(is_empty_sentinel(&Value::Null));
    }

    #[test]
    fn test_real_values_are_kept() {
        for value in [json!("Nancy"), json!("0"), json!(0), json!(false), json!([]), json!({})] {
            assert!(!is_empty_sentinel(&value), "{} should not be a sentinel", value);
        }
        // Substrings of sentinels are real data
        assert!(!is_empty_sentinel(&json!("Nathan")));
    }

    #[test]
    fn test_normalize_params_only_removes_sentinels() {
        let input = params(json!({
            "patientName": "Ada Lovelace",
            "phoneNumber": "N/A",
            "birthdayDateTime": null,
            "locationGUID": "<PII>",
            "childCount": 2,
            "notes": "  keep spacing  "
        }));

        let normalized = normalize_params(&input);

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized["patientName"], "Ada Lovelace");
        assert_eq!(normalized["childCount"], 2);
        assert_eq!(normalized["notes"], "  keep spacing  ");

        let mut removed = removed_keys(&input);
        removed.sort();
        assert_eq!(removed, vec!["birthdayDateTime", "locationGUID", "phoneNumber"]);
    }

    #[test]
    fn test_param_helpers() {
        let input = params(json!({"a": "x", "n": 42, "b": true, "o": {"k": 1}}));
        assert_eq!(param_str(&input, "a").as_deref(), Some("x"));
        assert_eq!(param_str(&input, "n").as_deref(), Some("42"));
        assert_eq!(param_str(&input, "b").as_deref(), Some("true"));
        assert_eq!(param_str(&input, "o"), None);
        assert_eq!(first_param(&input, &["missing", "n", "a"]).as_deref(), Some("42"));
    }
}
