//! HTTP API tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use deployctl::server::serve::router;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

use crate::support::{log_lines, Fixture};

fn app(fixture: &Fixture) -> Router {
    router(Arc::new(fixture.app.server_state()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Serve `app` on a local port and collect the text messages of a log stream
async fn follow_logs(app: Router, name: &str) -> Vec<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let url = format!("ws://{}/containers/{}/logs", addr, name);
    let (mut socket, _) = connect_async(url).await.unwrap();

    let mut texts = Vec::new();
    while let Some(message) = socket.next().await {
        match message.unwrap() {
            Message::Text(text) => texts.push(text.as_str().to_string()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    texts
}

#[tokio::test]
async fn test_ping_and_version() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(&app, Method::GET, "/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_get_deployment() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(&app, Method::GET, "/deployment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["name"], "Shop");
    assert_eq!(body["metadata"]["version"], "1.2.0");
    assert_eq!(body["current_state"], "stopped");
    assert_eq!(body["desired_state"], "stopped");
    assert_eq!(body["last_state_change"], Value::Null);
    assert!(body.get("last_transition").is_none());
}

#[tokio::test]
async fn test_put_deployment_accepts_transition() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);
    fixture.gateway.hold();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/deployment",
        Some(json!({ "desired_state": "running" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["desired_state"], "running");
    assert_eq!(body["current_state"], "stopped");
    assert_eq!(body["transitioning"], true);
    assert!(body["transition_id"].is_string());

    fixture.gateway.wait_for_call("up:start").await;
    let (_, body) = send(&app, Method::GET, "/deployment", None).await;
    assert_eq!(body["current_state"], "transitioning");
    assert_eq!(body["desired_state"], "running");
    fixture.gateway.release(1);
}

#[tokio::test]
async fn test_put_deployment_rejects_unknown_state() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/deployment",
        Some(json!({ "desired_state": "deleted" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidStateError");
    assert_eq!(body["category"], "client");
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/deployment",
        Some(json!({ "state": "running" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, body) = send(&app, Method::PUT, "/envs", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn test_put_deployment_with_unreachable_runtime() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);
    fixture.gateway.set_unavailable(true);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/deployment",
        Some(json!({ "desired_state": "running" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "BackendUnavailableError");
    assert_eq!(body["category"], "server");
}

#[tokio::test]
async fn test_delete_deployment() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let app = app(&fixture);

    let (status, body) = send(&app, Method::DELETE, "/deployment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["removed_volumes"], json!(["shop_db-data"]));
    assert_eq!(body["removed_containers"], json!(["shop-db-1", "shop-web-1"]));

    let (_, body) = send(&app, Method::GET, "/deployment", None).await;
    assert_eq!(body["current_state"], "stopped");
    assert_eq!(body["desired_state"], "stopped");
}

#[tokio::test]
async fn test_delete_deployment_with_failing_compose() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    fixture.gateway.fail_compose();
    let app = app(&fixture);

    let (status, body) = send(&app, Method::DELETE, "/deployment", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "BackendOperationFailedError");
    assert_eq!(body["category"], "server");
}

#[tokio::test]
async fn test_get_deployment_reports_failed_restart() {
    let fixture = Fixture::running().await;
    fixture.gateway.fail_compose();
    let app = app(&fixture);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/deployment",
        Some(json!({ "desired_state": "restarting" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let transition_id = body["transition_id"].clone();

    fixture.gateway.wait_for_call("down:failed").await;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let body = loop {
        let (_, body) = send(&app, Method::GET, "/deployment", None).await;
        if body["last_transition"]["result"] != "pending" {
            break body;
        }
        assert!(tokio::time::Instant::now() < deadline, "transition never finished");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };

    assert_eq!(body["current_state"], "running");
    assert_eq!(body["desired_state"], "restarting");
    assert_eq!(body["last_transition"]["transition_id"], transition_id);
    assert_eq!(body["last_transition"]["desired_state"], "restarting");
    assert_eq!(body["last_transition"]["result"], "failed");
    assert!(body["last_transition"]["error"]
        .as_str()
        .unwrap()
        .contains("simulated failure"));
}

#[tokio::test]
async fn test_envs() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(&app, Method::GET, "/envs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variables"][0]["name"], "WEB_PORT");
    assert_eq!(body["variables"][0]["type"], "integer");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/envs",
        Some(json!({ "variables": { "WEB_PORT": "9090", "MISSING": "x" }, "recreate_services": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Environment variables updated");
    assert_eq!(body["updated"], json!(["WEB_PORT"]));

    let (status, body) = send(
        &app,
        Method::PUT,
        "/envs",
        Some(json!({ "variables": { "MISSING": "x" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Environment variables updated");
    assert_eq!(body["updated"], json!([]));
    assert!(fixture.gateway.calls_starting_with("recreate").is_empty());
}

#[tokio::test]
async fn test_envs_reject_invalid_values() {
    let fixture = Fixture::new().await;
    let app = app(&fixture);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/envs",
        Some(json!({ "variables": { "UNUSED": "1\nINJECTED=yes" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
    assert_eq!(body["category"], "client");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/envs",
        Some(json!({ "variables": { "WEB_PORT": "eighty" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (_, body) = send(&app, Method::GET, "/envs", None).await;
    let names: Vec<&str> = body["variables"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v["name"].as_str())
        .collect();
    assert_eq!(names, vec!["WEB_PORT", "DB_PASSWORD", "UNUSED"]);
    assert_eq!(body["variables"][0]["value"], "8080");
}

#[tokio::test]
async fn test_envs_persistence_failure() {
    let fixture = Fixture::with_env_at("config/.env").await;
    let config_dir = fixture.dir.path().join("config");
    std::fs::remove_dir_all(&config_dir).unwrap();
    std::fs::write(&config_dir, "not a directory").unwrap();
    let app = app(&fixture);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/envs",
        Some(json!({ "variables": { "WEB_PORT": "9090" } })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "PersistenceError");
    assert_eq!(body["details"]["updated"], json!(["WEB_PORT"]));
}

#[tokio::test]
async fn test_containers() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let app = app(&fixture);

    let (status, body) = send(&app, Method::GET, "/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["containers"].as_array().map(Vec::len), Some(2));

    let (status, body) = send(&app, Method::GET, "/containers/web", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["container_name"], "shop-web-1");

    let (status, body) = send(
        &app,
        Method::POST,
        "/containers/web/control",
        Some(json!({ "action": "stop" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["container"], "web");
    assert_eq!(body["action"], "stop");
    assert_eq!(body["status"]["status"], "exited");
}

#[tokio::test]
async fn test_container_errors() {
    let fixture = Fixture::new().await;
    fixture.gateway.start_all();
    let app = app(&fixture);

    let (status, body) = send(&app, Method::GET, "/containers/cache", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ContainerNotFoundError");
    assert_eq!(body["category"], "client");

    let (status, body) = send(
        &app,
        Method::POST,
        "/containers/web/control",
        Some(json!({ "action": "pause" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    fixture.gateway.fail_actions();
    let (status, body) = send(
        &app,
        Method::POST,
        "/containers/web/control",
        Some(json!({ "action": "restart" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "VerificationFailedError");
    assert_eq!(body["category"], "server");
}

#[tokio::test]
async fn test_container_logs_stream() {
    let fixture = Fixture::running().await;

    let texts = follow_logs(app(&fixture), "web").await;
    assert_eq!(texts, log_lines("shop-web-1"));
}

#[tokio::test]
async fn test_container_logs_unknown_service() {
    let fixture = Fixture::running().await;

    let texts = follow_logs(app(&fixture), "cache").await;
    assert_eq!(texts.len(), 1);
    let body: Value = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(body["error"], "ContainerNotFoundError");
    assert_eq!(body["category"], "client");
}
