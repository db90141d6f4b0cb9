//! Tests for order-failure diagnosis
//!
//! Reference data comes from an in-memory source; the ordering service
//! is either a WireMock server or a scripted transport.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::core::ReqwestTransport;
    use crate::diagnosis::fix::propose_mutation;
    use crate::diagnosis::investigate::{investigate, Coupon, MenuItem, StoreProfile};
    use crate::diagnosis::resolution::resolution_steps;
    use crate::diagnosis::{
        categorize, CheckStatus, DiagnoseOptions, Diagnoser, DiagnosisPipeline, DiagnosisResult, DiagnosisService,
        ErrorCategory, FailureMonitor, HttpReferenceDataSource, Investigation, ItemKind, OrderLogRow, OrderLogStore,
        ProblematicItem, ReferenceDataSource, ReplayOutcome,
    };
    use crate::error::{EngineError, Result};
    use crate::tests::support::{raw, ScriptedTransport};

    // Fixtures

    #[derive(Default)]
    struct FakeReference {
        menu: Vec<MenuItem>,
        coupons: Vec<Coupon>,
        profile: Option<StoreProfile>,
        fail: bool,
    }

    #[async_trait]
    impl ReferenceDataSource for FakeReference {
        async fn menu(&self, _: &str, _: &str) -> Result<Vec<MenuItem>> {
            if self.fail {
                return Err(EngineError::network("connection refused"));
            }
            Ok(self.menu.clone())
        }

        async fn coupons(&self, _: &str, _: &str) -> Result<Vec<Coupon>> {
            if self.fail {
                return Err(EngineError::network("connection refused"));
            }
            Ok(self.coupons.clone())
        }

        async fn store_profile(&self, _: &str, store_id: &str) -> Result<StoreProfile> {
            self.profile
                .clone()
                .ok_or_else(|| EngineError::not_found(format!("no profile for {}", store_id)))
        }
    }

    fn menu_item(code: &str, category: &str, available: bool) -> MenuItem {
        MenuItem {
            code: code.to_string(),
            name: format!("Item {}", code),
            category: Some(category.to_string()),
            available,
        }
    }

    fn pizza_menu() -> FakeReference {
        FakeReference {
            menu: vec![
                menu_item("PZ-12", "pizza", false),
                menu_item("WG-1", "wings", true),
                menu_item("PZ-13", "pizza", true),
                menu_item("PZ-14", "pizza", true),
                menu_item("PZ-15", "pizza", true),
                menu_item("PZ-16", "pizza", true),
            ],
            ..FakeReference::default()
        }
    }

    fn failed_row(id: &str, error: &str, request_body: Value) -> OrderLogRow {
        OrderLogRow {
            id: id.to_string(),
            success: false,
            endpoint: "/api/orders".to_string(),
            method: "POST".to_string(),
            store_id: Some("4336".to_string()),
            error_message: Some(error.to_string()),
            error_stack: None,
            request_body,
            response_body: Value::Null,
            status_code: Some(400),
            created_at: None,
        }
    }

    fn item_row() -> OrderLogRow {
        failed_row(
            "log-1",
            "Item PZ-12 is not available at this location",
            json!({"storeId": "4336", "items": [{"code": "PZ-12", "qty": 1}], "serviceMethod": "Delivery"}),
        )
    }

    // Stage 1

    #[test]
    fn test_categorize_by_message() {
        let matched = categorize(&item_row());
        assert_eq!(matched.category, ErrorCategory::InvalidItem);
        assert_eq!(matched.confidence, 85);
        assert!(matched.evidence.contains("error message"));

        let coupon = failed_row("c", "Invalid coupon: SAVE20", json!({}));
        assert_eq!(categorize(&coupon).category, ErrorCategory::InvalidDiscountCode);

        let address = failed_row("a", "Address is outside the delivery area", json!({}));
        assert_eq!(categorize(&address).category, ErrorCategory::AddressError);
    }

    #[test]
    fn test_earlier_rule_wins() {
        let row = failed_row("s", "Store is closed; item PZ-12 unavailable", json!({}));
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::StoreUnavailable);
        assert_eq!(matched.confidence, 90);
    }

    #[test]
    fn test_categorize_searches_stack_and_body() {
        let mut row = failed_row("d", "Order failed", json!({}));
        row.status_code = Some(200);
        row.error_stack = Some("TypeError: Cannot read properties of undefined (reading 'price')".to_string());
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::InternalDefect);
        assert!(matched.evidence.contains("error stack"));

        let mut row = failed_row("b", "Order failed", json!({}));
        row.status_code = None;
        row.response_body = json!({"isOpen": false});
        assert_eq!(categorize(&row).category, ErrorCategory::StoreUnavailable);
    }

    #[test]
    fn test_status_only_match_is_less_confident() {
        let mut row = failed_row("t", "", json!({}));
        row.error_message = None;
        row.status_code = Some(504);
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::Timeout);
        assert_eq!(matched.confidence, 80);
        assert_eq!(matched.evidence, "HTTP status 504");
    }

    #[test]
    fn test_message_text_outranks_any_status_code() {
        let mut row = failed_row("v", "Validation failed: customer name is required", json!({}));
        row.status_code = Some(500);
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::InputValidation);
        assert_eq!(matched.confidence, 70);
        assert!(matched.evidence.starts_with("matched"));

        let mut row = failed_row("w", "Store is currently closed", json!({}));
        row.status_code = Some(504);
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::StoreUnavailable);
        assert_eq!(matched.confidence, 90);
    }

    #[test]
    fn test_unmatched_is_other() {
        let mut row = failed_row("o", "Something odd happened", json!({}));
        row.status_code = Some(409);
        let matched = categorize(&row);
        assert_eq!(matched.category, ErrorCategory::Other);
        assert_eq!(matched.confidence, 50);
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(
            serde_json::to_value(ErrorCategory::UnsupportedFulfillmentMethod).unwrap(),
            json!("unsupported-fulfillment-method")
        );
        assert!(ErrorCategory::InvalidDiscountCode.has_automated_fix());
        assert!(!ErrorCategory::StoreUnavailable.has_automated_fix());
    }

    // Stage 2

    #[tokio::test]
    async fn test_item_alternatives_share_category() {
        let investigation = investigate(ErrorCategory::InvalidItem, &item_row(), "http://orders", &pizza_menu()).await;

        assert_eq!(investigation.problematic_items.len(), 1);
        let problem = &investigation.problematic_items[0];
        assert_eq!(problem.kind, ItemKind::MenuItem);
        assert_eq!(problem.code, "PZ-12");
        assert_eq!(problem.alternatives, vec!["PZ-13", "PZ-14", "PZ-15"]);
        assert_eq!(investigation.checks[0].status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_coupon_checks() {
        let reference = FakeReference {
            coupons: vec![
                Coupon { code: "OLD10".to_string(), active: false, expires_at: None },
                Coupon {
                    code: "PAST".to_string(),
                    active: true,
                    expires_at: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
                },
                Coupon { code: "SAVE5".to_string(), active: true, expires_at: None },
            ],
            ..FakeReference::default()
        };
        let row = failed_row("c", "Invalid coupon", json!({"coupons": ["OLD10", "PAST"], "couponCode": "GONE"}));

        let investigation = investigate(ErrorCategory::InvalidDiscountCode, &row, "http://orders", &reference).await;

        let codes: Vec<&str> = investigation.problematic_items.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["OLD10", "PAST", "GONE"]);
        assert!(investigation.problematic_items[0].reason.contains("inactive"));
        assert!(investigation.problematic_items[1].reason.contains("expired"));
        assert!(investigation.problematic_items[2].reason.contains("does not exist"));
        assert_eq!(investigation.problematic_items[0].alternatives, vec!["SAVE5"]);
    }

    #[tokio::test]
    async fn test_fulfillment_and_store_status() {
        let reference = FakeReference {
            profile: Some(StoreProfile {
                is_open: false,
                is_online: true,
                service_methods: vec!["Carryout".to_string(), "DineIn".to_string()],
            }),
            ..FakeReference::default()
        };

        let fulfillment =
            investigate(ErrorCategory::UnsupportedFulfillmentMethod, &item_row(), "http://orders", &reference).await;
        assert_eq!(fulfillment.problematic_items[0].code, "Delivery");
        assert_eq!(fulfillment.problematic_items[0].alternatives, vec!["Carryout", "DineIn"]);

        let store = investigate(ErrorCategory::StoreUnavailable, &item_row(), "http://orders", &reference).await;
        let statuses: Vec<(&str, CheckStatus)> = store.checks.iter().map(|c| (c.name.as_str(), c.status)).collect();
        assert_eq!(statuses, vec![("store open", CheckStatus::Fail), ("store online", CheckStatus::Pass)]);
        assert!(store.problematic_items.is_empty());
    }

    #[tokio::test]
    async fn test_investigation_degrades_to_warnings() {
        let failing = FakeReference { fail: true, ..FakeReference::default() };
        let investigation = investigate(ErrorCategory::InvalidItem, &item_row(), "http://orders", &failing).await;
        assert_eq!(investigation.checks.len(), 1);
        assert_eq!(investigation.checks[0].name, "menu fetch");
        assert_eq!(investigation.checks[0].status, CheckStatus::Warn);

        let mut row = item_row();
        row.store_id = None;
        row.request_body = json!({"items": [{"code": "PZ-12"}]});
        let investigation = investigate(ErrorCategory::InvalidItem, &row, "http://orders", &pizza_menu()).await;
        assert_eq!(investigation.checks[0].name, "store id");
        assert!(investigation.problematic_items.is_empty());
    }

    #[tokio::test]
    async fn test_reference_fetch_encodes_store_id() {
        let transport = Arc::new(ScriptedTransport::new(vec![raw(200, json!({"items": []}))]));
        let source = HttpReferenceDataSource::new(transport.clone());

        assert!(source.menu("http://orders", "4336/coupons").await.unwrap().is_empty());
        assert_eq!(
            transport.requests.lock().unwrap()[0].url,
            "http://orders/api/stores/4336%2Fcoupons/menu"
        );

        let err = source.menu("http://orders", "..").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_http_reference_data_is_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stores/4336/menu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"code": "PZ-13", "name": "Pepperoni", "category": "pizza"}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stores/4336/profile"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "maintenance"})))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        let source = HttpReferenceDataSource::new(Arc::new(transport));

        let first = source.menu(&mock_server.uri(), "4336").await.unwrap();
        let second = source.menu(&mock_server.uri(), "4336").await.unwrap();
        assert_eq!(first, second);
        assert!(first[0].available);

        let err = source.store_profile(&mock_server.uri(), "4336").await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }

    // Stage 4

    #[test]
    fn test_propose_mutations() {
        let problems = vec![ProblematicItem {
            kind: ItemKind::DiscountCode,
            code: "OLD10".to_string(),
            reason: "inactive".to_string(),
            alternatives: vec![],
        }];
        let body = json!({"coupons": [{"code": "OLD10"}, {"code": "SAVE5"}], "couponCode": "old10"});
        let mutation = propose_mutation(ErrorCategory::InvalidDiscountCode, &body, &problems).unwrap();
        assert_eq!(mutation.request, json!({"coupons": [{"code": "SAVE5"}]}));
        assert_eq!(mutation.changes.len(), 2);

        let methods = vec![ProblematicItem {
            kind: ItemKind::FulfillmentMethod,
            code: "Delivery".to_string(),
            reason: "not offered".to_string(),
            alternatives: vec!["Carryout".to_string()],
        }];
        let mutation =
            propose_mutation(ErrorCategory::UnsupportedFulfillmentMethod, &json!({"serviceMethod": "Delivery"}), &methods)
                .unwrap();
        assert_eq!(mutation.request["serviceMethod"], "Carryout");

        // No remedy, or nothing to change
        assert!(propose_mutation(ErrorCategory::Timeout, &body, &problems).is_none());
        assert!(propose_mutation(ErrorCategory::InvalidItem, &json!({"items": [{"code": "PZ-12"}]}), &[]).is_none());
    }

    #[test]
    fn test_resolution_steps() {
        let steps = resolution_steps(ErrorCategory::StoreUnavailable, &[], None);
        assert_eq!(steps.len(), 2);

        let problems = vec![ProblematicItem {
            kind: ItemKind::MenuItem,
            code: "PZ-12".to_string(),
            reason: "unavailable".to_string(),
            alternatives: vec![],
        }];
        let steps = resolution_steps(ErrorCategory::InvalidItem, &problems, None);
        assert_eq!(steps[0], "Remove item PZ-12 from the order");
    }

    // Full pipeline

    #[tokio::test]
    async fn test_invalid_item_fix_is_verified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(body_string_contains("PZ-12"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Item PZ-12 is not available"})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(body_string_contains("PZ-13"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orderId": "o-1"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        let pipeline = DiagnosisPipeline::new(Arc::new(transport), Arc::new(pizza_menu()));

        let result = pipeline.run(&item_row(), &mock_server.uri(), DiagnoseOptions::default()).await;

        assert_eq!(result.category, ErrorCategory::InvalidItem);
        assert!(result.replay.attempted);
        assert!(!result.replay.succeeded);
        assert!(result.replay.same_failure);
        assert!(result.root_cause.contains("replay reproduced the failure"));

        let fix = result.fix_proposal.unwrap();
        assert!(fix.tested);
        assert!(fix.resolved);
        assert_eq!(fix.status_code, Some(200));
        assert_eq!(fix.changes, vec!["replaced item PZ-12 with PZ-13"]);
        assert_eq!(result.resolution[0], "Replace item PZ-12 with one of: PZ-13, PZ-14, PZ-15");
        assert_eq!(result.resolution[1], "Verified fix: replaced item PZ-12 with PZ-13");
    }

    #[tokio::test]
    async fn test_skipped_stages_send_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let pipeline = DiagnosisPipeline::new(transport.clone(), Arc::new(pizza_menu()));
        let options = DiagnoseOptions { skip_replay: true, skip_fix_test: true };

        let result = pipeline.run(&item_row(), "http://orders", options).await;

        assert!(!result.replay.attempted);
        assert!(result.replay.skipped_reason.is_some());
        assert!(result.fix_proposal.is_none());
        assert_eq!(result.investigation.problematic_items.len(), 1);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_store_closed_has_no_fix() {
        let transport = Arc::new(ScriptedTransport::default());
        let reference = FakeReference {
            profile: Some(StoreProfile { is_open: false, is_online: false, service_methods: vec![] }),
            ..FakeReference::default()
        };
        let pipeline = DiagnosisPipeline::new(transport.clone(), Arc::new(reference));
        let row = failed_row("log-2", "Store is currently closed", json!({"storeId": "4336", "items": []}));

        let result = pipeline
            .run(&row, "http://orders", DiagnoseOptions { skip_replay: true, skip_fix_test: false })
            .await;

        assert_eq!(result.category, ErrorCategory::StoreUnavailable);
        assert!(result.fix_proposal.is_none());
        assert_eq!(transport.request_count(), 0);
        assert!(result.resolution.iter().any(|s| s.contains("store hours")));
    }

    #[tokio::test]
    async fn test_replay_classifies_transient_and_persistent() {
        // Original timed out; replay succeeds
        let transport = Arc::new(ScriptedTransport::new(vec![raw(200, json!({"orderId": "o-2"}))]));
        let pipeline = DiagnosisPipeline::new(transport.clone(), Arc::new(FakeReference::default()));
        let mut row = failed_row("log-3", "Request timed out after 30000ms", json!({"storeId": "4336"}));
        row.status_code = Some(504);

        let result = pipeline
            .run(&row, "http://orders", DiagnoseOptions { skip_replay: false, skip_fix_test: true })
            .await;
        assert_eq!(result.category, ErrorCategory::Timeout);
        assert!(result.replay.succeeded);
        assert!(result.root_cause.contains("transient"));

        // Replay times out again
        let transport = Arc::new(ScriptedTransport::new(vec![Err(EngineError::timeout("Request timed out"))]));
        let pipeline = DiagnosisPipeline::new(transport, Arc::new(FakeReference::default()));
        let result = pipeline
            .run(&row, "http://orders", DiagnoseOptions { skip_replay: false, skip_fix_test: true })
            .await;
        assert!(result.replay.attempted);
        assert!(result.replay.same_failure);
        assert!(result.replay.error.is_some());
    }

    // Service and monitor

    #[derive(Default)]
    struct FakeOrderLog {
        rows: Mutex<Vec<OrderLogRow>>,
    }

    impl FakeOrderLog {
        fn push(&self, row: OrderLogRow) {
            self.rows.lock().unwrap().push(row);
        }
    }

    #[async_trait]
    impl OrderLogStore for FakeOrderLog {
        async fn get(&self, log_id: &str) -> Result<Option<OrderLogRow>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == log_id).cloned())
        }

        async fn recent_failures(&self, limit: usize) -> Result<Vec<OrderLogRow>> {
            Ok(self.rows.lock().unwrap().iter().rev().take(limit).cloned().collect())
        }
    }

    #[derive(Default)]
    struct CountingDiagnoser {
        calls: AtomicUsize,
        seen: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl Diagnoser for CountingDiagnoser {
        async fn diagnose(&self, row: &OrderLogRow, _: &str, _: DiagnoseOptions) -> DiagnosisResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap().entry(row.id.clone()).or_default() += 1;
            let matched = categorize(row);
            DiagnosisResult {
                log_id: row.id.clone(),
                category: matched.category,
                confidence: matched.confidence,
                evidence: matched.evidence.clone(),
                root_cause: matched.evidence,
                investigation: Investigation::default(),
                replay: ReplayOutcome::skipped("counting"),
                fix_proposal: None,
                resolution: vec![],
                diagnosed_at: Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn test_service_guards_rows() {
        let store = Arc::new(FakeOrderLog::default());
        let mut ok_row = item_row();
        ok_row.id = "log-ok".to_string();
        ok_row.success = true;
        store.push(ok_row);
        store.push(item_row());

        let diagnoser = Arc::new(CountingDiagnoser::default());
        let service = DiagnosisService::new(store, diagnoser.clone());

        let err = service.diagnose_log("log-missing", "http://orders", DiagnoseOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = service.diagnose_log("log-ok", "http://orders", DiagnoseOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let result = service.diagnose_log("log-1", "http://orders", DiagnoseOptions::default()).await.unwrap();
        assert_eq!(result.log_id, "log-1");
        assert_eq!(diagnoser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_monitor_diagnoses_each_failure_once() {
        let store = Arc::new(FakeOrderLog::default());
        store.push(failed_row("log-a", "Invalid coupon", json!({})));
        store.push(failed_row("log-b", "Store is closed", json!({})));

        let diagnoser = Arc::new(CountingDiagnoser::default());
        let monitor = FailureMonitor::new(store.clone(), diagnoser.clone(), "http://orders", DiagnoseOptions::default());

        assert_eq!(monitor.scan(10).await.unwrap().len(), 2);
        assert!(monitor.scan(10).await.unwrap().is_empty());

        store.push(failed_row("log-c", "Request timed out", json!({})));
        let third = monitor.scan(10).await.unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].log_id, "log-c");

        assert_eq!(monitor.diagnosed_count(), 3);
        assert_eq!(diagnoser.calls.load(Ordering::SeqCst), 3);
        assert!(diagnoser.seen.lock().unwrap().values().all(|count| *count == 1));
    }

    #[tokio::test]
    async fn test_monitor_remembers_only_the_latest_window() {
        let store = Arc::new(FakeOrderLog::default());
        let diagnoser = Arc::new(CountingDiagnoser::default());
        let monitor = FailureMonitor::new(store.clone(), diagnoser.clone(), "http://orders", DiagnoseOptions::default());

        for i in 0..6 {
            store.push(failed_row(&format!("log-{}", i), "Invalid coupon", json!({})));
            monitor.scan(2).await.unwrap();
            assert!(monitor.tracked_count() <= 2);
        }

        assert!(monitor.scan(2).await.unwrap().is_empty());
        assert_eq!(monitor.tracked_count(), 2);
        assert_eq!(monitor.diagnosed_count(), 6);
        assert_eq!(diagnoser.calls.load(Ordering::SeqCst), 6);
        assert!(diagnoser.seen.lock().unwrap().values().all(|count| *count == 1));
    }
}
