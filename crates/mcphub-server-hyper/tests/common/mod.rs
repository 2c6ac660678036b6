/*!
* 文件名: mod
* 作者: JQQ
* 创建日期: 2026/01/07
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, async-trait
* 描述: 测试公共工具模块 / Shared test helpers
*/
#![allow(dead_code)]

use async_trait::async_trait;
use mcphub_core::errors::ConnectError;
use mcphub_core::mcp_clients::{BackendConnection, ConnectOptions, Connector, ServerParameters};
use mcphub_core::{BackendDescriptor, HubConfig, McpHub, MemoryConfigStore, Profile};
use mcphub_proto::JsonRpcError;
use mcphub_server_hyper::{HubServerBuilder, ServerHandle};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// 带超时的测试辅助宏 / Test helper macro with timeout
#[macro_export]
macro_rules! with_timeout {
    ($future:expr) => {
        tokio::time::timeout(std::time::Duration::from_secs(30), $future)
            .await
            .expect("Test timed out")
    };
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 按后端ID给出固定工具集的连接器 / Connector serving a fixed tool set per backend id
pub struct StaticConnector;

#[async_trait]
impl Connector for StaticConnector {
    async fn open(
        &self,
        backend_id: &str,
        _params: ServerParameters,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn BackendConnection>, ConnectError> {
        let tools = match backend_id {
            "alpha" => vec!["search", "read"],
            "beta" => vec!["search", "write"],
            _ => vec!["echo"],
        };
        Ok(Arc::new(StaticConnection {
            backend_id: backend_id.to_string(),
            tools: tools.into_iter().map(str::to_string).collect(),
        }))
    }
}

pub struct StaticConnection {
    backend_id: String,
    tools: Vec<String>,
}

#[async_trait]
impl BackendConnection for StaticConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}, "resources": {}, "prompts": {}},
                "serverInfo": {"name": self.backend_id, "version": "0.0.1"},
            })),
            "tools/list" => Ok(json!({
                "tools": self.tools.iter().map(|t| json!({"name": t})).collect::<Vec<_>>()
            })),
            "resources/list" => Ok(json!({
                "resources": [{"uri": format!("memo://{}", self.backend_id), "name": "memo"}]
            })),
            "prompts/list" => Ok(json!({"prompts": [{"name": format!("{}-prompt", self.backend_id)}]})),
            "tools/call" => {
                let name = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(json!({"content": [{"type": "text", "text": format!("{}:{}", self.backend_id, name)}]}))
            }
            "resources/read" => {
                let uri = params
                    .as_ref()
                    .and_then(|p| p.get("uri"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(json!({"contents": [{"uri": uri, "text": format!("from {}", self.backend_id)}]}))
            }
            "prompts/get" => Ok(json!({"messages": [{"role": "user", "content": {"type": "text", "text": self.backend_id}}]})),
            other => Err(ConnectError::Rpc(JsonRpcError::method_not_found(other))),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn shutdown(&self, _grace: Duration) -> Result<(), ConnectError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

/// 启动带 alpha/beta 两个后端和 `work` 配置档的服务器
/// Start a server with backends alpha and beta and a `work` profile holding beta
pub async fn spawn_hub() -> (Arc<McpHub>, ServerHandle) {
    init_tracing();
    let hub = McpHub::builder(Arc::new(MemoryConfigStore::new()))
        .config(HubConfig {
            auto_start: false,
            ..Default::default()
        })
        .connector(Arc::new(StaticConnector))
        .build()
        .await
        .unwrap();
    for id in ["alpha", "beta"] {
        hub.install(BackendDescriptor::process(id, "node", format!("{}.js", id)))
            .await
            .unwrap();
    }
    hub.upsert_profile(Profile::new("work").with_backend("beta")).await.unwrap();
    hub.supervisor().start_all().await;

    let server = HubServerBuilder::new(hub.clone())
        .with_addr("127.0.0.1:0".parse().unwrap())
        .bind()
        .await
        .unwrap();
    (hub, server.spawn())
}

/// 发送一条JSON-RPC消息 / Post one JSON-RPC message
pub async fn post(url: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header("accept", "application/json, text/event-stream")
        .json(&body)
        .send()
        .await
        .unwrap()
}
