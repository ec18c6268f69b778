#![allow(clippy::unwrap_used)]
// Integration tests for `ResourceClient` using wiremock.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vitrine_api::{
    Action, Error, ItemId, ResourceClient, ResourceKey, RetryPolicy, Route, RouteTable,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ResourceClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = ResourceClient::with_client(reqwest::Client::new(), base_url, RouteTable::new())
        .with_retry(RetryPolicy::none());
    (server, client)
}

fn products() -> ResourceKey {
    ResourceKey::new("products")
}

// ── Collection reads ────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_bare_array() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"_id": "p1", "name": "Starter", "isHidden": false},
            {"_id": "p2", "name": "Pro", "isHidden": true}
        ])))
        .mount(&server)
        .await;

    let items: Vec<Value> = client.fetch_collection(&products()).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["name"], "Pro");
}

#[tokio::test]
async fn test_fetch_wrapped_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"_id": "s1", "status": "active"}]
        })))
        .mount(&server)
        .await;

    let items: Vec<Value> = client
        .fetch_collection(&ResourceKey::new("subscriptions"))
        .await
        .unwrap();

    assert_eq!(items, vec![json!({"_id": "s1", "status": "active"})]);
}

#[tokio::test]
async fn test_fetch_sends_route_query_params() {
    let server = MockServer::start().await;
    let routes = RouteTable::new().with_route(
        "networkAddresses",
        Route {
            path: Some("wallet/addresses".into()),
            query: vec!["network".into()],
        },
    );
    let client = ResourceClient::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("{}/api/", server.uri())).unwrap(),
        routes,
    );

    Mock::given(method("GET"))
        .and(path("/api/wallet/addresses"))
        .and(query_param("network", "trc20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "a1"}])))
        .mount(&server)
        .await;

    let key = ResourceKey::new("networkAddresses").with_param("trc20");
    let items: Vec<Value> = client.fetch_collection(&key).await.unwrap();
    assert_eq!(items.len(), 1);
}

// ── Error translation ───────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_surfaces_message() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "Database unavailable"})),
        )
        .mount(&server)
        .await;

    let err = client.fetch_collection::<Value>(&products()).await.unwrap_err();

    match err {
        Error::Server { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message.as_deref(), Some("Database unavailable"));
        }
        other => panic!("expected Server error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_without_message() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/products/p1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = client
        .remove(&products(), &ItemId::from("p1"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Server { status: 500, message: None }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_unauthorized_is_auth_expired() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
        .mount(&server)
        .await;

    let err = client
        .fetch_collection::<Value>(&ResourceKey::new("users"))
        .await
        .unwrap_err();

    assert!(err.is_auth_expired(), "got: {err:?}");
}

#[tokio::test]
async fn test_unexpected_shape() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("ok")))
        .mount(&server)
        .await;

    let err = client.fetch_collection::<Value>(&products()).await.unwrap_err();

    assert!(matches!(err, Error::Shape { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_success_false_is_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/announcements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Title is required"
        })))
        .mount(&server)
        .await;

    let err = client
        .create::<Value, _>(&ResourceKey::new("announcements"), &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.server_message(), Some("Title is required"));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 9 on loopback in the test environment.
    let client = ResourceClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9/api").unwrap(),
        RouteTable::new(),
    )
    .with_retry(RetryPolicy::none());

    let err = client.fetch_collection::<Value>(&products()).await.unwrap_err();

    assert!(matches!(err, Error::Network(_)), "got: {err:?}");
}

#[tokio::test]
async fn test_transient_read_is_retried_once() {
    let server = MockServer::start().await;
    let client = ResourceClient::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("{}/api", server.uri())).unwrap(),
        RouteTable::new(),
    )
    .with_retry(RetryPolicy {
        max_retries: 1,
        delay: std::time::Duration::from_millis(1),
    });

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "p1"}])))
        .mount(&server)
        .await;

    let items: Vec<Value> = client.fetch_collection(&products()).await.unwrap();
    assert_eq!(items.len(), 1);
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_returns_document() {
    let (server, client) = setup().await;
    let payload = json!({"name": "Gold", "price": 49});

    Mock::given(method("POST"))
        .and(path("/api/premiumPlans"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": {"_id": "pl1", "name": "Gold", "price": 49}
        })))
        .mount(&server)
        .await;

    let created: Value = client
        .create(&ResourceKey::new("premiumPlans"), &payload)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created["_id"], "pl1");
}

#[tokio::test]
async fn test_update_puts_to_item_path() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/products/p1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"_id": "p1", "name": "Renamed"})),
        )
        .mount(&server)
        .await;

    let updated: Value = client
        .update(&products(), &ItemId::from("p1"), &json!({"name": "Renamed"}))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated["name"], "Renamed");
}

#[tokio::test]
async fn test_patch_action_path_and_body() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/api/transactions/t1/reject"))
        .and(body_json(json!({"reason": "duplicate"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"_id": "t1", "status": "rejected"})),
        )
        .mount(&server)
        .await;

    let updated: Value = client
        .patch_action(
            &ResourceKey::new("transactions"),
            &ItemId::from("t1"),
            &Action::Reject,
            Some(&json!({"reason": "duplicate"})),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated["status"], "rejected");
}

#[tokio::test]
async fn test_acknowledged_action_has_no_document() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/api/products/p1/toggle-visibility"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Visibility updated"
        })))
        .mount(&server)
        .await;

    let updated: Option<Value> = client
        .patch_action(&products(), &ItemId::from("p1"), &Action::ToggleVisibility, None)
        .await
        .unwrap();

    assert_eq!(updated, None);
}

#[tokio::test]
async fn test_write_timeout_reports_configured_timeout() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let transport = TransportConfig {
        timeout: std::time::Duration::from_secs(1),
        retry: RetryPolicy::none(),
        ..TransportConfig::default()
    };
    let client = ResourceClient::new(base_url, RouteTable::new(), &transport).unwrap();

    Mock::given(method("PUT"))
        .and(path("/api/products/p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"_id": "p1"}))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client
        .update::<Value, _>(&products(), &ItemId::from("p1"), &json!({"name": "Slow"}))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Timeout { timeout_secs: 1 }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_remove_accepts_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/helpMessages/m1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client
        .remove(&ResourceKey::new("helpMessages"), &ItemId::from("m1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_cookie_is_sent() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let token = secrecy::SecretString::from("session-abc".to_string());
    let transport = TransportConfig::default().with_session(&base_url, "token", &token);
    let client = ResourceClient::new(base_url, RouteTable::new(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(header("cookie", "token=session-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let items: Vec<Value> = client.fetch_collection(&products()).await.unwrap();
    assert!(items.is_empty());
}
