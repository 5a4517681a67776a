#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test, panics are the assertion mechanism")]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uplink_core::{
    CircuitState, CredentialProvider, Gateway, GatewayConfig, GatewayError, RateLimitSource,
    RequestDescriptor, StaticTokenProvider,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Hands out `stale` until refreshed, then `fresh`.
struct RotatingProvider {
    current: Mutex<String>,
}

#[async_trait]
impl CredentialProvider for RotatingProvider {
    async fn get_token(&self) -> Result<Option<String>, GatewayError> {
        Ok(Some(self.current.lock().expect("poisoned").clone()))
    }

    async fn refresh_token(&self) -> Result<Option<String>, GatewayError> {
        let mut current = self.current.lock().expect("poisoned");
        *current = "fresh".to_string();
        Ok(Some(current.clone()))
    }
}

fn config_for(server: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::new(format!("{}/api", server.uri()));
    config.retry_attempts = 2;
    config.breaker.failure_threshold = 2;
    config.breaker.reset_timeout_ms = 60_000;
    config.backoff.base_delay_ms = 5;
    config.backoff.max_delay_ms = 20;
    config
}

fn gateway(server: &MockServer, token: &str) -> Gateway {
    let provider = Arc::new(StaticTokenProvider::new(Some(token.to_string())));
    Gateway::new(config_for(server), provider).expect("gateway builds")
}

#[tokio::test]
async fn test_get_with_token_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer secret"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let envelope = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/users").param("page", "2"))
        .await
        .expect("request succeeds");

    assert_eq!(envelope.status, 200);
    assert!(!envelope.cached);
    assert_eq!(envelope.data, serde_json::json!([{"id": 1}]));
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(body_json(serde_json::json!({"sku": "A-1", "qty": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 77})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let descriptor =
        RequestDescriptor::post("/orders").body(serde_json::json!({"sku": "A-1", "qty": 3}));
    let envelope = gateway.request::<serde_json::Value>(descriptor).await.expect("created");

    assert_eq!(envelope.status, 201);
    assert_eq!(envelope.data["id"], 77);
}

#[tokio::test]
async fn test_cached_get_hits_backend_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let first = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/catalog").cached())
        .await
        .expect("first call");
    let second = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/catalog").cached())
        .await
        .expect("second call");

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.data, first.data);
}

#[tokio::test]
async fn test_unauthorized_refreshes_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Arc::new(RotatingProvider { current: Mutex::new("stale".to_string()) });
    let gateway = Gateway::new(config_for(&server), provider).expect("gateway builds");

    let envelope = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/profile"))
        .await
        .expect("refreshed call succeeds");
    assert_eq!(envelope.data["name"], "ada");
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let envelope = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/reports").with_retry())
        .await
        .expect("second attempt succeeds");

    assert_eq!(envelope.data["ok"], true);
    let stats = gateway.breaker_stats("reports").expect("breaker created");
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 0);
}

#[tokio::test]
async fn test_upstream_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let result = gateway
        .request::<serde_json::Value>(RequestDescriptor::get("/search").with_retry())
        .await;

    assert_eq!(
        result.err(),
        Some(GatewayError::RateLimited { wait_ms: 2_000, origin: RateLimitSource::Upstream })
    );
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    let result = gateway
        .request::<serde_json::Value>(
            RequestDescriptor::get("/slow").timeout(Duration::from_millis(50)),
        )
        .await;

    assert!(matches!(result, Err(GatewayError::Timeout { .. })), "got {:?}", result);
    assert_eq!(gateway.breaker_stats("slow").map(|s| s.failure_count), Some(1));
}

#[tokio::test]
async fn test_failing_backend_opens_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/billing"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway(&server, "secret");
    for _ in 0..2 {
        let result = gateway.request::<serde_json::Value>(RequestDescriptor::get("/billing")).await;
        assert_eq!(
            result.err(),
            Some(GatewayError::Server { status: 500, message: "boom".to_string() })
        );
    }

    let result = gateway.request::<serde_json::Value>(RequestDescriptor::get("/billing")).await;
    assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })), "got {:?}", result);
    assert_eq!(gateway.breaker_stats("billing").map(|s| s.state), Some(CircuitState::Open));
}
