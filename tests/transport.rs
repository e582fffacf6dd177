//! SSE transport: authentication, admission control, session routing and
//! the request/acknowledge/reply cycle.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{FakeConverter, InMemoryStore};
use http_body_util::BodyExt;
use pageplane::api::{build_router, AppState};
use pageplane::config::Config;
use pageplane::publish::PageCache;
use pageplane::startup::build_state_with;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use zeroize::Zeroizing;

const TOKEN: &str = "s3cret";

async fn setup(max_requests: u32) -> (AppState, Router, TempDir) {
    let (state, router, dir, _) = setup_with_store(max_requests).await;
    (state, router, dir)
}

async fn setup_with_store(max_requests: u32) -> (AppState, Router, TempDir, Arc<InMemoryStore>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.auth.token = Some(Zeroizing::new(TOKEN.to_string()));
    config.rate_limit.max_requests = max_requests;
    config.publish.cache_path = dir.path().join("cache.json");
    config.confluence.default_space_key = Some("DOCS".to_string());

    let store = InMemoryStore::new();
    let state = build_state_with(&config, FakeConverter::new(), Some(store.clone()))
        .await
        .unwrap();
    let router = build_router(state.clone());
    (state, router, dir, store)
}

fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

fn rpc(id: i64, method: &str, params: Value) -> Body {
    Body::from(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string())
}

/// Next non-comment SSE event as (event, data)
async fn next_event(body: &mut Body) -> (String, String) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("timed out waiting for an SSE event")
            .expect("stream ended")
            .unwrap();
        let Ok(bytes) = frame.into_data() else {
            continue;
        };
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        let mut event = String::new();
        let mut data = String::new();
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data = value.trim().to_string();
            }
        }
        if !event.is_empty() {
            return (event, data);
        }
    }
}

/// Open a session and return its stream body and message endpoint
async fn open_session(router: &Router) -> (Body, String) {
    let response = router.clone().oneshot(authed("GET", "/sse", Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("mcp-session-id"));

    let mut body = response.into_body();
    let (event, endpoint) = next_event(&mut body).await;
    assert_eq!(event, "endpoint");
    assert!(endpoint.starts_with("/messages?sessionId=mcp-"));
    (body, endpoint)
}

async fn initialize(router: &Router, endpoint: &str, stream: &mut Body) {
    let params = json!({
        "protocolVersion": "2025-06-18",
        "capabilities": {},
        "clientInfo": {"name": "transport-test", "version": "1.0"}
    });
    let response =
        router.clone().oneshot(authed("POST", endpoint, rpc(1, "initialize", params))).await;
    assert_eq!(response.unwrap().status(), StatusCode::ACCEPTED);

    let (event, data) = next_event(stream).await;
    assert_eq!(event, "message");
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let (_, router, _dir) = setup(100).await;
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn sse_requires_the_shared_secret() {
    let (state, router, _dir) = setup(100).await;

    let missing = router
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = router
        .oneshot(
            Request::builder()
                .uri("/sse")
                .header("x-api-key", "not-it")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.sessions.total_sessions(), 0);
}

#[tokio::test]
async fn requests_over_the_limit_get_retry_after() {
    let (_, router, _dir) = setup(2).await;

    for _ in 0..2 {
        let response =
            router.clone().oneshot(authed("POST", "/messages", Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let limited = router.oneshot(authed("POST", "/messages", Body::empty())).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 =
        limited.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_escape_the_limit() {
    let (state, router, _dir) = setup(1).await;
    let peer: SocketAddr = "198.51.100.7:40000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..20 {
        let request = Request::builder()
            .method("POST")
            .uri("/messages")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .header("x-forwarded-for", format!("10.0.0.{}", i))
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap();
        statuses.push(router.clone().oneshot(request).await.unwrap().status());
    }

    assert_eq!(statuses[0], StatusCode::UNAUTHORIZED);
    assert!(statuses[1..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(state.rate_limiter.tracked_keys().await, 1);
}

#[tokio::test]
async fn unknown_and_malformed_sessions_are_not_found() {
    let (_, router, _dir) = setup(100).await;

    let unknown = "/messages?sessionId=mcp-550e8400-e29b-41d4-a716-446655440000";
    let response =
        router.clone().oneshot(authed("POST", unknown, rpc(1, "ping", json!({})))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let malformed = "/messages?sessionId=../../etc/passwd";
    let response = router.oneshot(authed("POST", malformed, rpc(1, "ping", json!({})))).await;
    assert_eq!(response.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replies_arrive_on_the_stream() {
    let (_, router, _dir) = setup(100).await;
    let (mut stream, endpoint) = open_session(&router).await;
    initialize(&router, &endpoint, &mut stream).await;

    let response =
        router.clone().oneshot(authed("POST", &endpoint, rpc(2, "tools/list", json!({})))).await;
    let response = response.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let echoed = response.headers()["mcp-session-id"].to_str().unwrap().to_string();
    assert!(endpoint.ends_with(&echoed));

    let (_, data) = next_event(&mut stream).await;
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["id"], 2);
    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"publish_page"));
    assert!(names.contains(&"render_diagrams"));
}

#[tokio::test]
async fn unparseable_body_is_a_parse_error() {
    let (_, router, _dir) = setup(100).await;
    let (_stream, endpoint) = open_session(&router).await;

    let response = router
        .oneshot(authed("POST", &endpoint, Body::from("{not json")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let reply: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply["error"]["code"], -32700);
}

#[tokio::test]
async fn tool_failures_come_back_as_error_results() {
    let (_, router, _dir) = setup(100).await;
    let (mut stream, endpoint) = open_session(&router).await;
    initialize(&router, &endpoint, &mut stream).await;

    let params = json!({
        "name": "update_page",
        "arguments": {"pageId": "404", "title": "T", "version": 1, "content": "# T"}
    });
    let response = router.clone().oneshot(authed("POST", &endpoint, rpc(3, "tools/call", params)));
    assert_eq!(response.await.unwrap().status(), StatusCode::ACCEPTED);

    let (_, data) = next_event(&mut stream).await;
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert!(reply["error"].is_null());
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(reply["result"]["structuredContent"]["error"]["kind"], "not_found");
}

#[tokio::test]
async fn disconnect_mid_publish_lets_the_call_finish() {
    let (state, router, dir, store) = setup_with_store(100).await;
    let (mut stream, endpoint) = open_session(&router).await;
    initialize(&router, &endpoint, &mut stream).await;
    assert_eq!(state.sessions.total_sessions(), 1);

    store.slow_creates(Duration::from_millis(300));
    let source = dir.path().join("runbook.md").to_string_lossy().into_owned();
    let params = json!({
        "name": "publish_page",
        "arguments": {"title": "Runbook", "content": "# Runbook", "sourcePath": source}
    });
    let response =
        router.clone().oneshot(authed("POST", &endpoint, rpc(4, "tools/call", params))).await;
    assert_eq!(response.unwrap().status(), StatusCode::ACCEPTED);

    // the store call is in flight when the client goes away
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.page_count(), 0);
    drop(stream);
    assert_eq!(state.sessions.total_sessions(), 0);

    let response = router.oneshot(authed("POST", &endpoint, rpc(5, "ping", json!({})))).await;
    assert_eq!(response.unwrap().status(), StatusCode::NOT_FOUND);

    let cache_path = dir.path().join("cache.json");
    let mapping = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let cache = PageCache::load(&cache_path).await.unwrap();
            if let Some(mapping) = cache.get(&source).await {
                return mapping;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("publish never completed");

    assert_eq!(store.page_count(), 1);
    let page = store.page(&mapping.page_id).unwrap();
    assert_eq!(page.page.title, "Runbook");
    assert_eq!(mapping.version, page.page.version);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (state, router, _dir) = setup(100).await;
    let (mut first, first_endpoint) = open_session(&router).await;
    let (mut second, second_endpoint) = open_session(&router).await;
    assert_ne!(first_endpoint, second_endpoint);
    assert_eq!(state.sessions.total_sessions(), 2);

    initialize(&router, &first_endpoint, &mut first).await;

    // the second session never initialized, so it cannot call tools
    let params = json!({"name": "list_mappings"});
    let response =
        router.clone().oneshot(authed("POST", &second_endpoint, rpc(9, "tools/call", params)));
    assert_eq!(response.await.unwrap().status(), StatusCode::ACCEPTED);

    let (_, data) = next_event(&mut second).await;
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], -32600);
}
