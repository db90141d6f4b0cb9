//! Tests for the tiered slot search

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::{EngineConfig, TenantKind};
    use crate::dates::{DateRangeCorrector, DateRangePolicy};
    use crate::error::EngineError;
    use crate::execution::{Executor, MockMap};
    use crate::registry::{registry_for, BuildContext, ToolName};
    use crate::search::{count_results, ExpansionSearch, SearchState};
    use crate::tests::support::{legacy_tenant, params, raw, today, ScriptedTransport};

    async fn run_search(
        transport: Arc<ScriptedTransport>,
        mock_map: Option<&MockMap>,
    ) -> (crate::search::SearchOutcome, Vec<String>) {
        let tenant = legacy_tenant("https://gw.example.com/ortho");
        let config = EngineConfig::single(tenant.clone());
        let ctx = BuildContext {
            correlation_token: "uui-test",
            tenant: &tenant,
        };
        let action = registry_for(TenantKind::Legacy)
            .lookup(ToolName::Scheduling, "slots")
            .unwrap();
        let corrector = DateRangeCorrector::new(
            DateRangePolicy::for_tenant(&config, &tenant),
            today(),
            tenant.date_format.clone(),
        );
        let executor = Executor::new(transport, tenant.authorization_header());
        let search = ExpansionSearch {
            executor: &executor,
            action,
            ctx: &ctx,
            corrector: &corrector,
            tiers: &tenant.expansion_tiers,
            mock_map,
        };

        let mut logs = Vec::new();
        let outcome = search
            .run(&params(json!({"startDate": "03/03/2025"})), &mut logs)
            .await
            .unwrap();
        (outcome, logs)
    }

    #[test]
    fn test_count_results() {
        assert_eq!(count_results(&json!({"slots": [1, 2]})), 2);
        assert_eq!(count_results(&json!({"groups": [], "records": [1]})), 1);
        assert_eq!(count_results(&json!({"data": {"availableSlots": [1]}})), 1);
        assert_eq!(count_results(&json!([1, 2, 3])), 3);
        assert_eq!(count_results(&json!({"slots": []})), 0);
        assert_eq!(count_results(&json!("nothing")), 0);
    }

    #[tokio::test]
    async fn test_third_tier_finds_slots() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            raw(200, json!({"slots": []})),
            raw(200, json!({"slots": []})),
            raw(200, json!({"slots": [{"startTime": "04/20/2025 9:00 AM"}]})),
        ]));

        let (outcome, logs) = run_search(transport.clone(), None).await;

        assert_eq!(outcome.state, SearchState::Found);
        assert_eq!(outcome.response["expansionTier"], 2);
        assert_eq!(outcome.response["searchExpanded"], true);
        assert_eq!(outcome.response["dateRange"]["startDate"], "03/03/2025");
        assert_eq!(outcome.response["dateRange"]["endDate"], "04/28/2025");
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(transport.request_count(), 3);

        // Each tier widens the window sent upstream
        let bodies: Vec<serde_json::Value> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| serde_json::from_str(r.body.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(bodies[0]["endDate"], "03/17/2025");
        assert_eq!(bodies[1]["endDate"], "03/31/2025");
        assert_eq!(bodies[2]["endDate"], "04/28/2025");

        let tier_lines: Vec<&String> = logs.iter().filter(|l| l.starts_with("[Search] Tier")).collect();
        assert!(tier_lines[0].starts_with("[Search] Tier 1/3"));
    }

    #[tokio::test]
    async fn test_first_tier_hit_is_not_expanded() {
        let transport = Arc::new(ScriptedTransport::new(vec![raw(200, json!({"slots": [{"id": 1}]}))]));

        let (outcome, _) = run_search(transport, None).await;

        assert!(outcome.found());
        assert_eq!(outcome.response["expansionTier"], 0);
        assert_eq!(outcome.response["searchExpanded"], false);
    }

    #[tokio::test]
    async fn test_errors_advance_to_next_tier() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(EngineError::timeout("Request timed out")),
            raw(500, json!({"message": "gateway exploded"})),
            raw(200, json!({"groups": [{"slots": [1, 2]}]})),
        ]));

        let (outcome, logs) = run_search(transport, None).await;

        assert!(outcome.found());
        assert_eq!(outcome.response["expansionTier"], 2);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(outcome.attempts[1].status, Some(500));
        assert!(logs.iter().any(|l| l.contains("Tier 2 failed: HTTP 500")));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_guidance() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            raw(200, json!({"slots": []})),
            raw(200, json!({"code": false, "error": ["No schedule views"]})),
            raw(200, json!({"slots": []})),
        ]));

        let (outcome, logs) = run_search(transport, None).await;

        assert_eq!(outcome.state, SearchState::Exhausted);
        assert_eq!(outcome.response["success"], false);
        assert_eq!(outcome.response["action_required"], "transfer to human agent");
        assert_eq!(outcome.response["tiersAttempted"], 3);
        assert_eq!(outcome.response["slots"], json!([]));
        assert_eq!(outcome.response["lastError"], "No schedule views");
        assert!(outcome.response["llm_guidance"]["instruction"].is_string());
        assert!(logs.last().unwrap().contains("Exhausted 3 tier(s)"));
    }

    #[tokio::test]
    async fn test_mock_search_uses_captured_response() {
        let mut map = MockMap::new();
        map.insert("getApptSlots".to_string(), json!({"slots": [{"id": "captured"}]}));
        let transport = Arc::new(ScriptedTransport::default());

        let (outcome, _) = run_search(transport.clone(), Some(&map)).await;

        assert!(outcome.found());
        assert_eq!(outcome.response["slots"][0]["id"], "captured");
        assert_eq!(transport.request_count(), 0);
    }
}
