//! Full stack integration tests: file-backed store + core hub + HTTP endpoint
#![cfg(feature = "full")]

use mcphub::mcphub_core::errors::LifecycleError;
use mcphub::mcphub_core::{HubConfig, LifecycleState, McpHub, Profile};
use mcphub::mcphub_server_hyper::{HubServerBuilder, JsonFileStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn open_hub(path: &std::path::Path) -> Arc<McpHub> {
    let store = Arc::new(JsonFileStore::open(path).await.unwrap());
    McpHub::builder(store)
        .config(HubConfig {
            auto_start: false,
            connect_timeout_ms: 2_000,
            ..Default::default()
        })
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_imported_backends_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mcphub.json");

    let hub = open_hub(&path).await;
    let ids = hub
        .import(&json!({"mcpServers": {
            "Unreachable Remote": {"url": "http://127.0.0.1:9/mcp"},
            "files": {"command": "npx", "args": ["-y", "server-filesystem", "/tmp"]}
        }}))
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    hub.upsert_profile(Profile::new("work").with_backend("files")).await.unwrap();

    let reopened = open_hub(&path).await;
    assert_eq!(reopened.registry().list().await.len(), 2);
    assert_eq!(reopened.router().get_profile("work").unwrap().backends, vec!["files"]);

    let stored: Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
    assert!(stored["backends"].is_array());
    assert!(stored["profiles"].is_array());
}

#[tokio::test]
async fn test_unreachable_backend_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let hub = open_hub(&dir.path().join("mcphub.json")).await;
    let ids = hub
        .import(&json!({"remote": {"url": "http://127.0.0.1:9/mcp"}}))
        .await
        .unwrap();
    let id = ids[0].clone();

    let err = timeout(TEST_TIMEOUT, hub.start(&id)).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ConnectFailed { needs_auth: false, .. } | LifecycleError::StartTimeout { .. }
    ));
    assert_eq!(hub.status(&id), LifecycleState::Stopped);

    let server = HubServerBuilder::new(hub.clone())
        .with_addr("127.0.0.1:0".parse().unwrap())
        .bind()
        .await
        .unwrap()
        .spawn();

    let health: Value = reqwest::get(server.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["running"], 0);
    assert_eq!(health["backends"][0]["state"], "stopped");
    assert!(health["backends"][0]["last_error"].is_string());

    let tools: Value = reqwest::Client::new()
        .post(server.url("/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tools["result"]["tools"], json!([]));

    timeout(TEST_TIMEOUT, server.shutdown()).await.unwrap().unwrap();
}
