//! Tests for the balancer HTTP API.
//!
//! Management endpoints run against an in-memory runtime. `/home` forwarding
//! is exercised against a real replica server bound to localhost.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use balancer::api::{router, ReplicaList};
use balancer::{AppState, RequestRouter};
use corelib::{HashMode, ServerId, SharedRing, SlotRing};
use http_body_util::BodyExt;
use orchestrator::{MemoryRuntime, OrchestratorConfig, ReplicaOrchestrator};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

/// App state over an empty 512/9 ring, forwarding to `replica_port`.
fn test_state(replica_port: u16) -> (Arc<MemoryRuntime>, AppState) {
    let ring = SharedRing::new(SlotRing::new(512, 9).unwrap());
    let runtime = Arc::new(MemoryRuntime::new());
    let orchestrator = Arc::new(ReplicaOrchestrator::new(
        ring.clone(),
        runtime.clone(),
        OrchestratorConfig {
            image: "replica:latest".into(),
            network: "lb-net".into(),
        },
    ));
    let router = RequestRouter::new(ring, replica_port, Duration::from_secs(2)).unwrap();
    (
        runtime,
        AppState {
            orchestrator,
            router: Arc::new(router),
        },
    )
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Send one request, return status and parsed JSON body.
async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn replica_list(body: &Value) -> ReplicaList {
    assert_eq!(body["status"], "successful");
    serde_json::from_value(body["message"].clone()).unwrap()
}

fn failure(body: &Value) -> &str {
    assert_eq!(body["status"], "failure");
    body["message"].as_str().unwrap()
}

async fn seed(state: &AppState, names: &[&str]) {
    let hostnames = names.iter().map(|s| s.to_string()).collect();
    state.orchestrator.scale_up(hostnames).await;
}

// ============================================================================
// /rep and /add
// ============================================================================

#[tokio::test]
async fn test_rep_empty() {
    let (_runtime, state) = test_state(5000);
    let (status, body) = send(&state, get("/rep")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": { "N": 0, "replicas": [] }, "status": "successful" })
    );
}

#[tokio::test]
async fn test_add_pads_with_random_hostnames() {
    let (runtime, state) = test_state(5000);
    let (status, body) = send(
        &state,
        json_request("POST", "/add", json!({ "n": 3, "hostnames": ["alpha"] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let list = replica_list(&body);
    assert_eq!(list.n, 3);
    assert!(list.replicas.contains(&"alpha".to_string()));
    assert_eq!(
        list.replicas
            .iter()
            .filter(|h| h.starts_with("server-") && h.len() == 13)
            .count(),
        2
    );
    assert_eq!(runtime.instance_names().len(), 3);
}

#[tokio::test]
async fn test_add_rejects_bad_payloads() {
    let (runtime, state) = test_state(5000);

    for payload in [
        json!({ "n": 2 }),
        json!({ "hostnames": ["a"] }),
        json!({ "n": 0, "hostnames": [] }),
        json!({ "n": "two", "hostnames": [] }),
    ] {
        let (status, body) = send(&state, json_request("POST", "/add", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(failure(&body), "<Error> Invalid payload");
    }

    let not_json = Request::builder()
        .method("POST")
        .uri("/add")
        .header("content-type", "application/json")
        .body(Body::from("n=3"))
        .unwrap();
    let (status, body) = send(&state, not_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(failure(&body), "<Error> Invalid payload");

    let (status, body) = send(
        &state,
        json_request("POST", "/add", json!({ "n": 1, "hostnames": ["a", "b"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        failure(&body),
        "<Error> Length of hostname list is more than newly added instances"
    );

    assert_eq!(runtime.create_calls(), 0);
}

#[tokio::test]
async fn test_add_reports_success_despite_individual_failure() {
    let (runtime, state) = test_state(5000);
    runtime.fail_creates("broken");

    let (status, body) = send(
        &state,
        json_request("POST", "/add", json!({ "n": 2, "hostnames": ["ok", "broken"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = replica_list(&body);
    assert_eq!(list.replicas, vec!["ok".to_string()]);
}

// ============================================================================
// /rm
// ============================================================================

#[tokio::test]
async fn test_rm_named_and_random() {
    let (runtime, state) = test_state(5000);
    seed(&state, &["a", "b", "c"]).await;

    let (status, body) = send(
        &state,
        json_request("DELETE", "/rm", json!({ "n": 2, "hostnames": ["a"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = replica_list(&body);
    assert_eq!(list.n, 1);
    assert!(!list.replicas.contains(&"a".to_string()));
    assert_eq!(runtime.instance_names(), list.replicas);
}

#[tokio::test]
async fn test_rm_rejects_bad_counts() {
    let (_runtime, state) = test_state(5000);
    seed(&state, &["a", "b"]).await;

    let (status, body) = send(
        &state,
        json_request("DELETE", "/rm", json!({ "n": 1, "hostnames": ["a", "b"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        failure(&body),
        "<Error> Length of hostname list is more than number of instances to remove"
    );

    let (status, body) = send(
        &state,
        json_request("DELETE", "/rm", json!({ "n": 3, "hostnames": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        failure(&body),
        "<Error> Length of hostname list is more than removable instances"
    );

    let (status, body) = send(&state, json_request("DELETE", "/rm", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(failure(&body), "<Error> Invalid payload");

    assert_eq!(state.orchestrator.ring().list_replicas().len(), 2);
}

// ============================================================================
// /function
// ============================================================================

#[tokio::test]
async fn test_function_switches_mode() {
    let (_runtime, state) = test_state(5000);
    seed(&state, &["a", "b", "c"]).await;

    let (status, body) = send(
        &state,
        json_request("POST", "/function", json!({ "useDefault": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Hash function set to custom", "status": "successful" })
    );
    assert_eq!(state.orchestrator.ring().hash_mode(), HashMode::Alternate);
    assert_eq!(state.orchestrator.ring().list_replicas().len(), 3);

    let (_, body) = send(
        &state,
        json_request("POST", "/function", json!({ "useDefault": true })),
    )
    .await;
    assert_eq!(body["message"], "Hash function set to default");
    assert_eq!(state.orchestrator.ring().hash_mode(), HashMode::Default);
}

#[tokio::test]
async fn test_function_rejects_bad_payloads() {
    let (_runtime, state) = test_state(5000);

    let (status, body) = send(&state, json_request("POST", "/function", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(failure(&body), "<Error> Invalid payload");

    let (status, body) = send(
        &state,
        json_request("POST", "/function", json!({ "useDefault": "yes" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(failure(&body), "<Error> 'useDefault' must be a boolean");
}

// ============================================================================
// /home and unknown paths
// ============================================================================

async fn spawn_replica_server(server_id: &str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = balancer::replica::router(server_id);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn register(state: &AppState, hostname: &str) {
    state
        .orchestrator
        .ring()
        .write()
        .add_server(hostname, ServerId::from_hostname(hostname))
        .unwrap();
}

#[tokio::test]
async fn test_home_without_replicas() {
    let (_runtime, state) = test_state(5000);
    let (status, body) = send(&state, get("/home")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "message": "No available servers", "status": "failure" })
    );
}

#[tokio::test]
async fn test_home_forwards_to_replica() {
    let port = spawn_replica_server("replica-a").await;
    let (_runtime, state) = test_state(port);
    register(&state, "127.0.0.1");

    let (status, body) = send(&state, get("/home")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Hello from Server: replica-a", "status": "successful" })
    );
}

#[tokio::test]
async fn test_home_unreachable_replica() {
    // grab a free port, then close it
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let (_runtime, state) = test_state(port);
    register(&state, "127.0.0.1");

    let (status, body) = send(&state, get("/home")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failure(&body), "Error forwarding request to 127.0.0.1");
    assert!(state.orchestrator.ring().contains("127.0.0.1"));
}

#[tokio::test]
async fn test_unknown_get_path() {
    let (_runtime, state) = test_state(5000);
    let (status, body) = send(&state, get("/nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        failure(&body),
        "<Error> '/nope' endpoint does not exist in server replicas"
    );
}

#[tokio::test]
async fn test_replica_server_endpoints() {
    let app = balancer::replica::router("server-3");

    let response = app.clone().oneshot(get("/heartbeat")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());

    let response = app.oneshot(get("/home")).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "Hello from Server: server-3");
}
