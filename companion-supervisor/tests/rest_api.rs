//! Integration tests for the REST API.

mod common;

use common::{FakeRuntime, StaticTags, TestServer, supervisor};
use companion_supervisor::rest::ApiError;
use companion_supervisor::rest::handlers::{Ack, SetVersionRequest, VersionInfo};
use companion_supervisor::{DesiredState, ObservedState, Reconciler, ServiceStatus};
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

async fn spawn_running(services: &[(&str, bool)]) -> TestServer {
    let server = TestServer::spawn(supervisor(services, FakeRuntime::new())).await;
    Reconciler::new(server.supervisor.clone())
        .reconcile_once()
        .await;
    server
}

#[tokio::test]
async fn test_get_version() {
    let server = TestServer::spawn(supervisor(&[], FakeRuntime::new())).await;

    let resp = server.get("/version").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let info: VersionInfo = resp.json().await.unwrap();
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_lists_every_service() {
    let server = spawn_running(&[("a", true), ("b", false)]).await;

    let resp = server.get("/status").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let status: BTreeMap<String, ServiceStatus> = resp.json().await.unwrap();
    assert_eq!(status.len(), 2);
    assert_eq!(status["a"].desired, DesiredState::Enabled);
    assert_eq!(status["a"].consecutive_failed_starts, 1);
    assert_eq!(status["b"].desired, DesiredState::Disabled);
    assert_eq!(status["b"].observed, ObservedState::Stopped);

    server.shutdown().await;
}

#[tokio::test]
async fn test_enable_and_disable() {
    let server = TestServer::spawn(supervisor(&[("a", false)], FakeRuntime::new())).await;

    let resp = server.post("/services/a/enable").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Ack = resp.json().await.unwrap();
    assert_eq!(ack.service, "a");
    assert!(ack.ok);

    let status = server.supervisor.get_status().await;
    assert_eq!(status["a"].desired, DesiredState::Enabled);

    let resp = server.post("/services/a/disable").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let status = server.supervisor.get_status().await;
    assert_eq!(status["a"].desired, DesiredState::Disabled);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_service_returns_404() {
    let server = TestServer::spawn(supervisor(&[("a", true)], FakeRuntime::new())).await;

    for path in ["/services/ghost/enable", "/services/ghost/disable", "/services/ghost/restart", "/services/ghost/attach"] {
        let resp = server.post(path).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "POST {path}");
        let err: ApiError = resp.json().await.unwrap();
        assert_eq!(err.code, 404);
        assert!(err.error.contains("ghost"));
    }

    for path in ["/services/ghost/top", "/services/ghost/logs", "/services/ghost/versions"] {
        let resp = server.get(path).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "GET {path}");
    }

    let resp = server
        .put_json(
            "/services/ghost/version",
            &SetVersionRequest {
                version: "2.0".to_string(),
            },
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_set_version() {
    let server = TestServer::spawn(supervisor(&[("a", true)], FakeRuntime::new())).await;

    let resp = server
        .put_json(
            "/services/a/version",
            &SetVersionRequest {
                version: "2.0".to_string(),
            },
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.supervisor.get_status().await["a"].version, "2.0");

    server.shutdown().await;
}

#[tokio::test]
async fn test_no_container_returns_409() {
    let server = TestServer::spawn(supervisor(&[("a", false)], FakeRuntime::new())).await;

    let resp = server.post("/services/a/restart").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let err: ApiError = resp.json().await.unwrap();
    assert_eq!(err.code, 409);

    let resp = server.get("/services/a/logs").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    server.shutdown().await;
}

#[tokio::test]
async fn test_restart_passes_payload_through() {
    let server = spawn_running(&[("a", true)]).await;

    let resp = server.post("/services/a/restart").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let payload: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(payload["container"], "a-1");
    assert_eq!(payload["restarted"], true);

    server.shutdown().await;
}

#[tokio::test]
async fn test_top_and_logs() {
    let server = spawn_running(&[("a", true)]).await;

    let resp = server.get("/services/a/top").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let top: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(top["titles"][0], "PID");
    assert_eq!(top["processes"][0][1], "sleep 5");

    let resp = server.get("/services/a/logs").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(resp.text().await.unwrap(), "a says hello\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_available_versions() {
    let mut tags = HashMap::new();
    tags.insert("org/a".to_string(), vec!["1.0".to_string(), "2.0".to_string()]);
    let sup = supervisor(&[("a", true)], FakeRuntime::new()).with_versions(Arc::new(StaticTags(tags)));
    let server = TestServer::spawn(sup).await;

    let resp = server.get("/services/a/versions").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let versions: Vec<String> = resp.json().await.unwrap();
    assert_eq!(versions, vec!["1.0", "2.0"]);

    // No manifest configured
    let resp = server.get("/releases").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let releases: BTreeMap<String, bool> = resp.json().await.unwrap();
    assert!(releases.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_openapi_document() {
    let server = TestServer::spawn(supervisor(&[], FakeRuntime::new())).await;

    let resp = server
        .client
        .get(format!("http://{}/api-docs/openapi.json", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let doc: serde_json::Value = resp.json().await.unwrap();
    assert!(doc["paths"]["/api/v1/status"].is_object());
    assert!(doc["paths"]["/api/v1/services/{name}/enable"].is_object());

    server.shutdown().await;
}
