/*!
* 文件名: pool.rs
* 作者: JQQ
* 创建日期: 2025/12/18
* 最后修改日期: 2026/01/14
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, chrono, tracing
* 描述: 后端连接池 / Backend connection pool
*/

use crate::errors::ConnectError;
use crate::inputs::render_descriptor;
use crate::mcp_clients::session;
use crate::mcp_clients::{BackendConnection, ConnectOptions, Connector, TransportConnector};
use crate::registry::BackendDescriptor;
use chrono::{DateTime, Utc};
use mcphub_proto::{CapabilityCatalogue, InitializeResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// 连接池选项 / Pool options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// 握手超时 / Handshake timeout
    pub connect_timeout: Duration,
    /// 优雅关闭宽限期 / Graceful shutdown grace period
    pub disconnect_grace: Duration,
    /// 转发请求超时 / Forwarded request timeout
    pub request_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            disconnect_grace: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// 运行中的连接 / A live backend connection
pub struct RunningConnection {
    pub backend_id: String,
    connection: Arc<dyn BackendConnection>,
    catalogue: std::sync::RwLock<Arc<CapabilityCatalogue>>,
    forbidden_tools: Vec<String>,
    init: InitializeResult,
    pub connected_at: DateTime<Utc>,
}

impl RunningConnection {
    /// 当前能力目录快照 / Snapshot of the current catalogue
    pub fn catalogue(&self) -> Arc<CapabilityCatalogue> {
        self.catalogue.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 握手时后端报告的服务器信息 / Server info reported during the handshake
    pub fn server_info(&self) -> &mcphub_proto::Implementation {
        &self.init.server_info
    }

    pub fn transport_kind(&self) -> &'static str {
        self.connection.kind()
    }

    /// 连接自行关闭的信号 / Signal raised when the connection closes on its own
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.connection.closed()
    }

    fn replace_catalogue(&self, catalogue: Arc<CapabilityCatalogue>) {
        *self.catalogue.write().unwrap_or_else(|e| e.into_inner()) = catalogue;
    }
}

fn strip_forbidden(mut catalogue: CapabilityCatalogue, forbidden: &[String]) -> CapabilityCatalogue {
    if !forbidden.is_empty() {
        catalogue.tools.retain(|t| !forbidden.contains(&t.name));
    }
    catalogue
}

/// 后端连接池 / Backend connection pool
///
/// 每个后端最多一条连接。能力目录只在连接建立、刷新和断开时写入。
/// At most one connection per backend. Catalogues are written only on connect, refresh and disconnect.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    connections: RwLock<HashMap<String, Arc<RunningConnection>>>,
    options: PoolOptions,
}

impl ConnectionPool {
    pub fn new(options: PoolOptions) -> Self {
        Self::with_connector(Arc::new(TransportConnector), options)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, options: PoolOptions) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// 建立连接并完成握手 / Connect and complete the handshake
    ///
    /// 失败时不会留下任何进程或会话。
    /// A failure leaves no process or session behind.
    pub async fn connect(&self, descriptor: &BackendDescriptor) -> Result<Arc<CapabilityCatalogue>, ConnectError> {
        if let Some(existing) = self.connections.read().await.get(&descriptor.id) {
            debug!("Backend {} already connected", descriptor.id);
            return Ok(existing.catalogue());
        }

        let params =
            render_descriptor(descriptor).map_err(|e| ConnectError::InvalidParameters(e.to_string()))?;
        let options = ConnectOptions {
            request_timeout: self.options.request_timeout,
        };
        info!("Connecting backend {} over {}", descriptor.id, params.kind());

        // 超时时握手future被丢弃，子进程随之终止
        let (connection, init, catalogue) =
            match tokio::time::timeout(self.options.connect_timeout, self.establish(descriptor, params, &options))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ConnectError::TimeoutError(format!(
                        "handshake with {} exceeded {:?}",
                        descriptor.id, self.options.connect_timeout
                    )))
                }
            };

        let catalogue = Arc::new(strip_forbidden(catalogue, &descriptor.forbidden_tools));
        let running = Arc::new(RunningConnection {
            backend_id: descriptor.id.clone(),
            connection,
            catalogue: std::sync::RwLock::new(catalogue.clone()),
            forbidden_tools: descriptor.forbidden_tools.clone(),
            init,
            connected_at: Utc::now(),
        });
        self.connections
            .write()
            .await
            .insert(descriptor.id.clone(), running);
        info!(
            "Backend {} connected: {} tools, {} resources, {} prompts",
            descriptor.id,
            catalogue.tools.len(),
            catalogue.resources.len(),
            catalogue.prompts.len()
        );
        Ok(catalogue)
    }

    async fn establish(
        &self,
        descriptor: &BackendDescriptor,
        params: crate::mcp_clients::ServerParameters,
        options: &ConnectOptions,
    ) -> Result<(Arc<dyn BackendConnection>, InitializeResult, CapabilityCatalogue), ConnectError> {
        let connection = self.connector.open(&descriptor.id, params, options).await?;
        let handshake = async {
            let init = session::initialize(connection.as_ref()).await?;
            let catalogue = session::fetch_catalogue(connection.as_ref(), &init).await?;
            Ok::<_, ConnectError>((init, catalogue))
        };
        match handshake.await {
            Ok((init, catalogue)) => Ok((connection, init, catalogue)),
            Err(e) => {
                debug!("Handshake with {} failed: {}", descriptor.id, e);
                if let Err(close_err) = connection.shutdown(self.options.disconnect_grace).await {
                    warn!("Cleanup after failed handshake of {}: {}", descriptor.id, close_err);
                }
                Err(e)
            }
        }
    }

    /// 断开连接 / Disconnect
    ///
    /// 返回是否存在连接。宽限期后仍未退出的进程会被强制终止，错误仅供日志使用。
    /// Returns whether a connection existed. A process still alive after the grace period is
    /// terminated; the error is for logging only.
    pub async fn disconnect(&self, id: &str) -> Result<bool, ConnectError> {
        let Some(running) = self.connections.write().await.remove(id) else {
            return Ok(false);
        };
        info!("Disconnecting backend {}", id);
        running.connection.shutdown(self.options.disconnect_grace).await?;
        Ok(true)
    }

    /// 断开所有连接 / Disconnect everything
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.disconnect(&id).await {
                warn!("Disconnect of {} reported: {}", id, e);
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<RunningConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// 能力目录 / Capability catalogue of a connected backend
    pub async fn list_capabilities(&self, id: &str) -> Option<Arc<CapabilityCatalogue>> {
        self.get(id).await.map(|running| running.catalogue())
    }

    /// 重新查询能力目录 / Re-query the capability catalogue
    pub async fn refresh_capabilities(&self, id: &str) -> Result<Arc<CapabilityCatalogue>, ConnectError> {
        let running = self.get(id).await.ok_or(ConnectError::NotConnected)?;
        let catalogue = session::fetch_catalogue(running.connection.as_ref(), &running.init).await?;
        let catalogue = Arc::new(strip_forbidden(catalogue, &running.forbidden_tools));
        running.replace_catalogue(catalogue.clone());
        Ok(catalogue)
    }

    /// 调用工具 / Call a tool on a backend
    pub async fn call_tool(&self, id: &str, name: &str, arguments: Value) -> Result<Value, ConnectError> {
        let running = self.get(id).await.ok_or(ConnectError::NotConnected)?;
        session::call_tool(running.connection.as_ref(), name, arguments).await
    }

    /// 读取资源 / Read a resource from a backend
    pub async fn read_resource(&self, id: &str, uri: &str) -> Result<Value, ConnectError> {
        let running = self.get(id).await.ok_or(ConnectError::NotConnected)?;
        session::read_resource(running.connection.as_ref(), uri).await
    }

    /// 获取提示 / Get a prompt from a backend
    pub async fn get_prompt(&self, id: &str, name: &str, arguments: Value) -> Result<Value, ConnectError> {
        let running = self.get(id).await.ok_or(ConnectError::NotConnected)?;
        session::get_prompt(running.connection.as_ref(), name, arguments).await
    }
}
