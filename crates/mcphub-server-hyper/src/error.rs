/*!
* 文件名: error.rs
* 作者: JQQ
* 创建日期: 2026/01/05
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: thiserror
* 描述: HTTP服务器错误 / HTTP server errors
*/

use mcphub_core::HubError;
use std::net::SocketAddr;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// 服务器错误 / Server error
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    /// 监听失败，进程无法继续 / Listener could not bind, fatal at startup
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
