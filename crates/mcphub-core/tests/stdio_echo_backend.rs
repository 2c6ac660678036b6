/*!
* 文件名: stdio_echo_backend
* 作者: JQQ
* 创建日期: 2026/01/13
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json
* 描述: 使用真实子进程的stdio冒烟测试 / stdio smoke tests against a real child process
*/
mod common;

use mcphub_core::errors::{ConnectError, LifecycleError};
use mcphub_core::{BackendDescriptor, HubConfig, LifecycleState, McpHub, MemoryConfigStore};
use serde_json::json;
use std::sync::Arc;

const ECHO_BACKEND: &str = env!("CARGO_BIN_EXE_mcphub-echo-backend");

async fn hub() -> Arc<McpHub> {
    common::init_tracing();
    McpHub::builder(Arc::new(MemoryConfigStore::new()))
        .config(HubConfig {
            auto_start: false,
            disconnect_grace_ms: 2_000,
            ..Default::default()
        })
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_echo_backend_lifecycle() {
    let hub = hub().await;
    hub.install(BackendDescriptor::process("echo", ECHO_BACKEND, "--tool greet --tool shout"))
        .await
        .unwrap();

    with_timeout!(hub.start("echo")).unwrap();
    assert_eq!(hub.status("echo"), LifecycleState::Running);

    let connection = hub.pool().get("echo").await.unwrap();
    assert_eq!(connection.transport_kind(), "stdio");
    assert_eq!(connection.server_info().name, "mcphub-echo-backend");

    let view = hub.view(None).await.unwrap();
    let names: Vec<_> = view.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["greet", "shout"]);

    let result = with_timeout!(hub.pool().call_tool("echo", "greet", json!({"who": "world"}))).unwrap();
    assert_eq!(result["content"][0]["text"], r#"{"who":"world"}"#);

    let refreshed = with_timeout!(hub.pool().refresh_capabilities("echo")).unwrap();
    assert_eq!(refreshed.tools.len(), 2);

    with_timeout!(hub.stop("echo"));
    assert_eq!(hub.status("echo"), LifecycleState::Stopped);
    assert!(!hub.pool().is_connected("echo").await);
}

#[tokio::test]
async fn test_exited_process_is_marked_stopped() {
    let hub = hub().await;
    hub.install(BackendDescriptor::process("crashy", ECHO_BACKEND, "--tool echo --tool quit --exit-on quit"))
        .await
        .unwrap();
    with_timeout!(hub.start("crashy")).unwrap();

    let mut state = hub.supervisor().watch_backend("crashy");
    let err = with_timeout!(hub.pool().call_tool("crashy", "quit", json!({}))).unwrap_err();
    assert!(matches!(err, ConnectError::ConnectionError(_)));

    with_timeout!(state.wait_for(|s| *s == LifecycleState::Stopped)).unwrap();
    assert!(!hub.pool().is_connected("crashy").await);
    assert!(hub.view(None).await.unwrap().tools.is_empty());
    assert_eq!(
        hub.supervisor().last_error("crashy"),
        Some(LifecycleError::BackendExited { id: "crashy".into() })
    );

    with_timeout!(hub.start("crashy")).unwrap();
    assert_eq!(hub.status("crashy"), LifecycleState::Running);
    with_timeout!(hub.stop("crashy"));
}

#[tokio::test]
async fn test_echo_backend_auth_failure() {
    let hub = hub().await;
    hub.install(BackendDescriptor::process("locked", ECHO_BACKEND, "--fail-auth"))
        .await
        .unwrap();

    let err = with_timeout!(hub.start("locked")).unwrap_err();
    match err {
        LifecycleError::NeedsAuthorization(challenge) => {
            assert_eq!(challenge.backend_id, "locked");
            assert!(challenge.endpoint.is_none());
        }
        other => panic!("expected an authorization challenge, got {:?}", other),
    }
    assert_eq!(hub.status("locked"), LifecycleState::Stopped);
    assert!(!hub.pool().is_connected("locked").await);
}

#[tokio::test]
async fn test_missing_command_fails_to_start() {
    let hub = hub().await;
    hub.install(BackendDescriptor::process("ghost", "/definitely/not/a/binary", ""))
        .await
        .unwrap();

    let err = with_timeout!(hub.start("ghost")).unwrap_err();
    assert!(matches!(err, LifecycleError::ConnectFailed { needs_auth: false, .. }));
    assert!(hub.supervisor().last_error("ghost").is_some());
}
