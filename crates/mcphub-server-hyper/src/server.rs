/*!
* 文件名: server.rs
* 作者: JQQ
* 创建日期: 2026/01/05
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, hyper, hyper-util
* 描述: 集线器HTTP服务器 / Hub HTTP server
*/

use crate::error::{ServerError, ServerResult};
use crate::handler::HubService;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use mcphub_core::McpHub;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 空闲会话的清理间隔 / How often idle client sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 服务器构建器 / Server builder
pub struct HubServerBuilder {
    hub: Arc<McpHub>,
    addr: Option<SocketAddr>,
}

impl HubServerBuilder {
    pub fn new(hub: Arc<McpHub>) -> Self {
        Self { hub, addr: None }
    }

    /// 覆盖监听地址（默认取自配置） / Override the listen address (defaults to the config)
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// 绑定端口 / Bind the listener
    pub async fn bind(self) -> ServerResult<HubServer> {
        let addr = match self.addr {
            Some(addr) => addr,
            None => {
                let config = self.hub.config();
                format!("{}:{}", config.host, config.port)
                    .parse::<SocketAddr>()
                    .map_err(|e| ServerError::InvalidAddress(format!("{}:{} ({})", config.host, config.port, e)))?
            }
        };
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!("MCP hub listening on http://{}", local_addr);

        Ok(HubServer {
            service: Arc::new(HubService::new(self.hub)),
            listener,
            local_addr,
        })
    }
}

/// 已绑定的服务器 / A bound server
pub struct HubServer {
    service: Arc<HubService>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl HubServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn service(&self) -> &Arc<HubService> {
        &self.service
    }

    /// 运行直到Ctrl-C / Run until Ctrl-C
    pub async fn run(self) -> ServerResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// 运行直到 `shutdown` 完成，然后停止所有后端
    /// Run until `shutdown` resolves, then stop every backend
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut sweep = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.service.expire_idle_sessions();
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            let service = self.service.clone();
                            tokio::spawn(async move {
                                let svc = service_fn(move |req| {
                                    let service = service.clone();
                                    async move { service.handle(req).await }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), svc)
                                    .await
                                {
                                    debug!("Connection from {} closed with error: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => error!("Accept failed: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.service.hub().shutdown().await;
        info!("MCP hub stopped");
        Ok(())
    }

    /// 在后台运行，返回可用于关闭的句柄 / Run in the background and return a handle to stop it
    pub fn spawn(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let addr = self.local_addr;
        let task = tokio::spawn(self.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        ServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// 后台服务器句柄 / Handle to a background server
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<ServerResult<()>>,
}

impl ServerHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 通知关闭并等待后端全部停止 / Signal shutdown and wait for every backend to stop
    pub async fn shutdown(mut self) -> ServerResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Io(std::io::Error::other(e))),
        }
    }
}
