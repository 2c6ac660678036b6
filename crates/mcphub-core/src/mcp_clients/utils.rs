/*!
* 文件名: utils.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: async-trait
* 描述: 按传输类型创建客户端 / Client factory by transport kind
*/

use super::base::{BackendConnection, Connector};
use super::http_client::HttpMCPClient;
use super::model::{ConnectOptions, ServerParameters};
use super::stdio_client::StdioMCPClient;
use crate::errors::ConnectError;
use async_trait::async_trait;
use std::sync::Arc;

/// 客户端工厂函数 / Client factory function
pub async fn client_factory(
    backend_id: &str,
    params: ServerParameters,
    options: &ConnectOptions,
) -> Result<Arc<dyn BackendConnection>, ConnectError> {
    let client: Arc<dyn BackendConnection> = match params {
        ServerParameters::Stdio(params) => {
            Arc::new(StdioMCPClient::spawn(backend_id, params, options.request_timeout).await?)
        }
        ServerParameters::StreamableHttp(params) => {
            Arc::new(HttpMCPClient::new(backend_id, params, options.request_timeout)?)
        }
    };
    Ok(client)
}

/// 默认连接器：真实的子进程与HTTP客户端
/// Default connector backed by real child processes and HTTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportConnector;

#[async_trait]
impl Connector for TransportConnector {
    async fn open(
        &self,
        backend_id: &str,
        params: ServerParameters,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn BackendConnection>, ConnectError> {
        client_factory(backend_id, params, options).await
    }
}
