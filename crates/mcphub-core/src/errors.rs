/*!
* 文件名: errors.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: thiserror
* 描述: 核心模块的错误定义 / Error definitions for the hub core
*/

use crate::supervisor::AuthChallenge;
use mcphub_proto::JsonRpcError;
use std::time::Duration;
use thiserror::Error;

/// 核心模块的Result类型别名 / Result type alias for the hub core
pub type HubResult<T> = Result<T, HubError>;

/// 核心模块的错误类型 / Error type for the hub core
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid descriptor: {0}")]
    /// 描述符无效，在任何状态变化前拒绝 / Malformed descriptor, rejected before any state change
    InvalidDescriptor(String),

    #[error("Unknown backend: {0}")]
    /// 后端不存在 / Backend not registered
    UnknownBackend(String),

    #[error("Profile not found: {0}")]
    /// 配置档不存在 / Profile not found
    ProfileNotFound(String),

    #[error("Invalid profile: {0}")]
    /// 配置档无效 / Invalid profile
    InvalidProfile(String),

    #[error(transparent)]
    /// 生命周期错误 / Lifecycle error
    Lifecycle(#[from] LifecycleError),

    #[error("Config store error: {0}")]
    /// 配置存储错误 / Config store error
    Store(String),

    #[error("IO error: {0}")]
    /// IO错误 / IO error
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    /// 序列化错误 / Serialization error
    SerializationError(#[from] serde_json::Error),
}

/// 启动/停止的结果错误 / Outcome error of a start or stop request
///
/// 需要 `Clone`：并发的 start 调用者共享同一个结果。
/// Must be `Clone`: concurrent start callers share one outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("Unknown backend: {id}")]
    UnknownBackend { id: String },

    #[error("Backend {} needs authorization before it can connect", .0.backend_id)]
    /// 需要交互式授权，用户完成后以 force_auth_retry 重试
    /// Interactive authorization required; retry with force_auth_retry once the user completed it
    NeedsAuthorization(AuthChallenge),

    #[error("Failed to connect to {id}: {message}")]
    ConnectFailed {
        id: String,
        needs_auth: bool,
        message: String,
    },

    #[error("Backend {id} did not finish its handshake within {timeout_ms}ms")]
    StartTimeout { id: String, timeout_ms: u64 },

    #[error("Start of {id} was cancelled by a stop request")]
    StartCancelled { id: String },

    #[error("Backend {id} exited while running")]
    /// 运行中的后端自行退出 / A running backend went away on its own
    BackendExited { id: String },
}

impl LifecycleError {
    /// 是否为授权失败 / Whether the failure is an authorization requirement
    pub fn needs_auth(&self) -> bool {
        match self {
            LifecycleError::NeedsAuthorization(_) => true,
            LifecycleError::ConnectFailed { needs_auth, .. } => *needs_auth,
            _ => false,
        }
    }

    pub fn backend_id(&self) -> &str {
        match self {
            LifecycleError::UnknownBackend { id }
            | LifecycleError::ConnectFailed { id, .. }
            | LifecycleError::StartTimeout { id, .. }
            | LifecycleError::StartCancelled { id }
            | LifecycleError::BackendExited { id } => id,
            LifecycleError::NeedsAuthorization(challenge) => &challenge.backend_id,
        }
    }
}

/// 连接池/客户端错误 / Connection pool and client error
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    #[error("Authorization required: {0}")]
    /// 握手收到授权挑战 / Handshake hit an authorization challenge
    AuthRequired(String),

    #[error("Invalid server parameters: {0}")]
    InvalidParameters(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Backend did not shut down within {0:?} and was terminated")]
    /// 断开超时（仅记录日志） / Disconnect timed out (logged only)
    DisconnectTimeout(Duration),

    #[error("Not connected to server")]
    NotConnected,

    #[error("Backend returned an error: {0}")]
    /// 后端返回的JSON-RPC错误 / JSON-RPC error returned by the backend
    Rpc(JsonRpcError),
}

impl ConnectError {
    /// 是否为授权失败 / Whether this failure needs interactive authorization
    pub fn needs_auth(&self) -> bool {
        match self {
            ConnectError::AuthRequired(_) => true,
            ConnectError::Rpc(err) => err.is_auth_required(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(err: serde_json::Error) -> Self {
        ConnectError::ProtocolError(err.to_string())
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        ConnectError::ConnectionError(err.to_string())
    }
}
