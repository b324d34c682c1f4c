//! HTTP API tests driven through `tower::ServiceExt::oneshot`, no socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vigil_core::clock::ManualClock;
use vigil_core::{MemoryStore, Registry};
use vigil_devkit::fixtures::{self, EnvelopeBuilder};
use vigil_kernel::http::build_router;
use vigil_kernel::state::AppState;

const KEY: &str = "test-key";

struct Api {
    app: Router,
    state: AppState,
    clock: Arc<ManualClock>,
}

fn api() -> Api {
    let clock = Arc::new(ManualClock::new(time::OffsetDateTime::now_utc()));
    let registry = Arc::new(Registry::default().with_clock(clock.clone()));
    let state = AppState::new(registry, Arc::new(MemoryStore::new()), Some(KEY.to_string()));
    Api { app: build_router(state.clone()), state, clock }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri).header("x-api-key", KEY);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn observe(app: &Router, env: &vigil_core::Envelope) -> Value {
    let (status, body) = send(app, "POST", "/observations", Some(serde_json::to_value(env).unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_is_open_everything_else_needs_key() {
    let api = api();

    let response = api
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .app
        .clone()
        .oneshot(Request::builder().uri("/resources").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = api
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/resources")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_is_closed_without_configured_key() {
    let registry = Arc::new(Registry::default());
    let state = AppState::new(registry, Arc::new(MemoryStore::new()), Some(String::new()));
    let app = build_router(state);
    let (status, _) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn observation_creates_resource() {
    let api = api();
    let body = observe(&api.app, &fixtures::aws_instance()).await;

    assert_eq!(body["resource"]["id"], "aws-123456789012-i-0abc");
    assert_eq!(body["resource"]["status"], "online");
    assert_eq!(body["namespace"], "AWS/EC2");
    assert!(body["agent"]["id"].as_str().unwrap().starts_with("agent-"));

    let (status, body) = send(&api.app, "GET", "/resources/aws-123456789012-i-0abc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "host");
    assert!(body.get("updated").is_none());
}

#[tokio::test]
async fn log_signal_adds_log_labels() {
    let api = api();
    let env = EnvelopeBuilder::based_on(fixtures::bare_metal()).extra("facility", "auth").build();
    let payload = serde_json::to_value(&env).unwrap();
    let (status, body) = send(&api.app, "POST", "/observations?signal=log", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resource"]["labels"]["facility"], "auth");
}

#[tokio::test]
async fn unknown_resource_is_404() {
    let api = api();
    let (status, body) = send(&api.app, "GET", "/resources/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn list_with_filters() {
    let api = api();
    observe(&api.app, &fixtures::bare_metal()).await;
    observe(&api.app, &fixtures::podman_container()).await;

    let (status, body) = send(&api.app, "GET", "/resources?kind=container", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&api.app, "GET", "/resources?kind=host,agent", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(&api.app, "GET", "/resources?label.job=vigil-container", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&api.app, "GET", "/resources?kind=vm", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_validates_paging() {
    let api = api();
    observe(&api.app, &fixtures::podman_container()).await;

    let (status, body) = send(&api.app, "GET", "/resources/search?q=nginx", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "container-web1-abcdef012345");

    let (status, body) = send(&api.app, "GET", "/resources/search?q=nginx&limit=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid filter criteria"));

    let (status, _) = send(&api.app, "GET", "/resources/search?q=web&offset=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hierarchy_endpoints() {
    let api = api();
    observe(&api.app, &fixtures::podman_container()).await;

    let (_, orphans) = send(&api.app, "GET", "/resources/orphans", None).await;
    assert_eq!(orphans.as_array().unwrap().len(), 1);

    observe(&api.app, &fixtures::bare_metal()).await;
    let (_, orphans) = send(&api.app, "GET", "/resources/orphans", None).await;
    assert!(orphans.as_array().unwrap().is_empty());

    let (status, children) = send(&api.app, "GET", "/resources/host-web1-10-0-0-5/children", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(children[0]["id"], "container-web1-abcdef012345");

    let (status, _) = send(&api.app, "GET", "/resources/ghost/children", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tag_lifecycle() {
    let api = api();
    observe(&api.app, &fixtures::bare_metal()).await;
    let uri = "/resources/host-web1-10-0-0-5/tags";

    let (status, body) = send(&api.app, "PUT", uri, Some(json!({"team": "sre", "tier": "1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!({"team": "sre", "tier": "1"}));

    let (_, body) = send(&api.app, "PUT", uri, Some(json!({"team": "core"}))).await;
    assert_eq!(body["tags"], json!({"team": "core", "tier": "1"}));

    let (_, body) = send(&api.app, "DELETE", "/resources/host-web1-10-0-0-5/tags/tier", None).await;
    assert_eq!(body["tags"], json!({"team": "core"}));

    let (_, body) = send(&api.app, "PUT", &format!("{uri}?replace=true"), Some(json!({"owner": "bob"}))).await;
    assert_eq!(body["tags"], json!({"owner": "bob"}));

    let (status, _) = send(&api.app, "PUT", "/resources/ghost/tags", Some(json!({"a": "b"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_flush_and_purge() {
    let api = api();
    observe(&api.app, &fixtures::bare_metal()).await;

    let (_, stats) = send(&api.app, "GET", "/stats", None).await;
    assert_eq!(stats["registry"]["total"], 2);
    assert_eq!(stats["registry"]["pending_writes"], 2);
    assert_eq!(stats["kernel"]["observations"], 1);
    assert_eq!(stats["store"], "memory");

    let (_, flushed) = send(&api.app, "POST", "/flush", None).await;
    assert_eq!(flushed["written"], 2);
    assert_eq!(api.state.registry.pending_writes().len(), 0);

    let (status, _) = send(&api.app, "DELETE", "/resources/host-web1-10-0-0-5", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&api.app, "GET", "/resources/host-web1-10-0-0-5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn swept_resource_reports_offline() {
    let api = api();
    observe(&api.app, &fixtures::bare_metal()).await;
    api.clock.advance(time::Duration::minutes(10));
    vigil_kernel::monitor::sweep_once(&api.state);

    let (_, body) = send(&api.app, "GET", "/resources?status=offline", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    let (_, stats) = send(&api.app, "GET", "/stats", None).await;
    assert_eq!(stats["kernel"]["marked_offline"], 2);
}
