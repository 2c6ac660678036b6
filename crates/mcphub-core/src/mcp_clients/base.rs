/*!
* 文件名: base.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: async-trait, serde_json
* 描述: 后端连接与连接器trait / Backend connection and connector traits
*/

use super::model::{ConnectOptions, ServerParameters};
use crate::errors::ConnectError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 一条到后端的已打开的JSON-RPC通道 / An open JSON-RPC channel to one backend
///
/// 握手和目录获取由连接池在此之上完成。
/// The pool performs the handshake and catalogue fetch on top of it.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// 发送请求并等待响应 / Send a request and wait for its response
    ///
    /// 后端返回的JSON-RPC错误以 [`ConnectError::Rpc`] 返回。
    /// JSON-RPC errors returned by the backend come back as [`ConnectError::Rpc`].
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectError>;

    /// 发送通知 / Send a notification
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectError>;

    /// 关闭连接，宽限期后强制终止 / Close the connection, forcing termination after the grace period
    async fn shutdown(&self, grace: Duration) -> Result<(), ConnectError>;

    /// 传输类型 / Transport kind
    fn kind(&self) -> &'static str;

    /// 连接意外关闭时变为 `true` / Turns `true` when the connection closes on its own
    ///
    /// 发送端被丢弃而未置位表示主动关闭；默认实现从不报告。
    /// A sender dropped without setting it means a deliberate close; the default never reports.
    fn closed(&self) -> watch::Receiver<bool> {
        watch::channel(false).1
    }
}

/// 连接器：根据参数打开通道 / Connector: opens a channel for rendered parameters
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        backend_id: &str,
        params: ServerParameters,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn BackendConnection>, ConnectError>;
}
