//! Tests for live and mock execution
//!
//! Live mode runs against a WireMock server.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::core::{HttpMethod, ReqwestTransport};
    use crate::error::EngineError;
    use crate::execution::{mock_key, Executor, MockMap};
    use crate::tests::support::ScriptedTransport;

    fn live_executor(auth: Option<&str>) -> Executor {
        let transport = ReqwestTransport::with_timeout(Duration::from_millis(500)).expect("transport");
        Executor::new(Arc::new(transport), auth.map(str::to_string))
    }

    #[test]
    fn test_mock_key_is_last_segment() {
        assert_eq!(mock_key("https://gw.example.com/ortho-prd/getApptSlots"), "getApptSlots");
        assert_eq!(mock_key("https://api.example.com/v1/patients/77/appointments"), "appointments");
        assert_eq!(mock_key("getPatient"), "getPatient");
    }

    #[tokio::test]
    async fn test_mock_hit_returns_captured_value() {
        let transport = Arc::new(ScriptedTransport::default());
        let executor = Executor::new(transport.clone(), None);
        let mut map = MockMap::new();
        map.insert("getPatient".to_string(), json!({"patient": {"patientGUID": "p-1"}}));
        let mut logs = Vec::new();

        let outcome = executor
            .execute("https://gw.example.com/ortho/getPatient", HttpMethod::Post, &json!({}), &mut logs, Some(&map))
            .await
            .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.data["patient"]["patientGUID"], "p-1");
        assert_eq!(transport.request_count(), 0);
        assert!(logs[0].starts_with("[Mock]"));
    }

    #[tokio::test]
    async fn test_mock_miss_is_404_without_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let executor = Executor::new(transport.clone(), None);
        let map = MockMap::new();
        let mut logs = Vec::new();

        let outcome = executor
            .execute("https://gw.example.com/ortho/createAppt", HttpMethod::Post, &json!({}), &mut logs, Some(&map))
            .await
            .unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.status, 404);
        assert_eq!(outcome.data["error"], "No captured response for key 'createAppt'");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_live_call_sends_auth_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ortho/getPatient"))
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .and(body_json(json!({"uui": "u", "patientGUID": "p-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"patient": {"name": "Ada"}})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let executor = live_executor(Some("Basic dXNlcjpwYXNz"));
        let mut logs = Vec::new();
        let outcome = executor
            .execute(
                &format!("{}/ortho/getPatient", mock_server.uri()),
                HttpMethod::Post,
                &json!({"uui": "u", "patientGUID": "p-1"}),
                &mut logs,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.data["patient"]["name"], "Ada");
        assert!(logs[0].starts_with("[HTTP] POST"));
        assert!(logs.iter().any(|l| l.starts_with("[HTTP] Body:")));
        assert_eq!(logs.last().unwrap(), "[HTTP] Response: 200 OK");
        // Credentials never reach the decision trace
        assert!(logs.iter().all(|l| !l.contains("dXNlcjpwYXNz")));
    }

    #[tokio::test]
    async fn test_live_get_sends_no_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/patients/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"patient": {"id": 77}})))
            .mount(&mock_server)
            .await;

        let executor = live_executor(None);
        let mut logs = Vec::new();
        let outcome = executor
            .execute(&format!("{}/v1/patients/77", mock_server.uri()), HttpMethod::Get, &Value::Null, &mut logs, None)
            .await
            .unwrap();

        assert!(outcome.ok);
        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
        assert!(logs.iter().all(|l| !l.starts_with("[HTTP] Body:")));
    }

    #[tokio::test]
    async fn test_non_json_body_falls_back_to_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ortho/getLocation"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&mock_server)
            .await;

        let executor = live_executor(None);
        let mut logs = Vec::new();
        let outcome = executor
            .execute(&format!("{}/ortho/getLocation", mock_server.uri()), HttpMethod::Post, &json!({}), &mut logs, None)
            .await
            .unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.status, 502);
        assert_eq!(outcome.data, json!("<html>Bad Gateway</html>"));
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let executor = live_executor(None);
        let mut logs = Vec::new();
        let err = executor
            .execute(&format!("{}/ortho/getApptSlots", mock_server.uri()), HttpMethod::Post, &json!({}), &mut logs, None)
            .await
            .unwrap_err();

        assert!(matches!(err.root(), EngineError::Timeout(_)));
        assert!(logs.last().unwrap().starts_with("[HTTP] Request failed"));
    }
}
