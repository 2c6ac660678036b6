/*!
* 文件名: mod
* 作者: JQQ
* 创建日期: 2026/01/10
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, async-trait
* 描述: 测试公共工具模块：可编排的模拟连接器
*/
#![allow(dead_code)]

use async_trait::async_trait;
use mcphub_core::errors::ConnectError;
use mcphub_core::mcp_clients::{BackendConnection, ConnectOptions, Connector, ServerParameters};
use mcphub_core::{BackendDescriptor, MemoryConfigStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

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

/// 单个模拟后端的行为 / Behaviour of one mock backend
#[derive(Clone, Default)]
pub struct MockBehavior {
    pub tools: Vec<String>,
    pub delay: Duration,
    pub failure: Option<ConnectError>,
    /// 为true时，在authorize()之前一直返回授权挑战 / Challenge until authorize() is called
    pub requires_auth: bool,
}

impl MockBehavior {
    pub fn tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, failure: ConnectError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

/// 模拟连接器 / Mock connector
#[derive(Default)]
pub struct MockConnector {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    opens: Mutex<HashMap<String, usize>>,
    authorized: AtomicBool,
    exits: Mutex<HashMap<String, watch::Sender<bool>>>,
    pub shutdowns: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, backend_id: &str, behavior: MockBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(backend_id.to_string(), behavior);
    }

    pub fn authorize(&self) {
        self.authorized.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self, backend_id: &str) -> usize {
        self.opens.lock().unwrap().get(backend_id).copied().unwrap_or(0)
    }

    /// 模拟最近一次打开的连接意外关闭 / Make the latest connection of a backend close on its own
    pub fn crash(&self, backend_id: &str) {
        if let Some(exit) = self.exits.lock().unwrap().get(backend_id) {
            exit.send_replace(true);
        }
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn tool_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        backend_id: &str,
        _params: ServerParameters,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn BackendConnection>, ConnectError> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(backend_id.to_string())
            .or_insert(0) += 1;
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(backend_id)
            .cloned()
            .unwrap_or_else(|| MockBehavior::tools(&["echo"]));

        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        if let Some(failure) = behavior.failure {
            return Err(failure);
        }
        if behavior.requires_auth && !self.authorized.load(Ordering::SeqCst) {
            return Err(ConnectError::AuthRequired(
                "HTTP 401 Unauthorized (Bearer realm=\"mock\")".to_string(),
            ));
        }
        let (exit_tx, exited) = watch::channel(false);
        self.exits.lock().unwrap().insert(backend_id.to_string(), exit_tx);
        Ok(Arc::new(MockConnection {
            backend_id: backend_id.to_string(),
            tools: behavior.tools,
            exited,
            shutdowns: self.shutdowns.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// 模拟连接 / Mock connection
pub struct MockConnection {
    backend_id: String,
    tools: Vec<String>,
    exited: watch::Receiver<bool>,
    shutdowns: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl BackendConnection for MockConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.backend_id, "version": "0.0.1"},
            })),
            "tools/list" => Ok(json!({
                "tools": self.tools.iter().map(|t| json!({"name": t, "inputSchema": {"type": "object"}})).collect::<Vec<_>>()
            })),
            "tools/call" => {
                let name = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.calls
                    .lock()
                    .unwrap()
                    .push((self.backend_id.clone(), name.clone()));
                Ok(json!({
                    "content": [{"type": "text", "text": format!("{}:{}", self.backend_id, name)}]
                }))
            }
            "ping" => Ok(json!({})),
            other => Err(ConnectError::Rpc(mcphub_proto::JsonRpcError::method_not_found(other))),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn shutdown(&self, _grace: Duration) -> Result<(), ConnectError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }
}

/// 预置若干stdio后端描述符的内存存储 / Memory store pre-seeded with stdio descriptors
pub fn store_with_backends(ids: &[&str]) -> Arc<MemoryConfigStore> {
    let backends: Vec<BackendDescriptor> = ids
        .iter()
        .map(|id| BackendDescriptor::process(*id, "node", "server.js"))
        .collect();
    Arc::new(
        MemoryConfigStore::new()
            .with_value(mcphub_core::config::BACKENDS_KEY, serde_json::to_value(backends).unwrap()),
    )
}
