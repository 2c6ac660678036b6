/*!
* 文件名: state.rs
* 作者: JQQ
* 创建日期: 2025/12/19
* 最后修改日期: 2026/01/14
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde, chrono
* 描述: 生命周期状态与授权挑战 / Lifecycle state and authorization challenge
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 后端生命周期状态 / Backend lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// 已停止 / Stopped
    #[default]
    Stopped,
    /// 启动中 / Starting
    Starting,
    /// 运行中 / Running
    Running,
    /// 停止中 / Stopping
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Stopping => write!(f, "stopping"),
        }
    }
}

/// 授权挑战 / Authorization challenge
///
/// 后端握手要求交互式登录时产生，强制重试或放弃后清除。
/// Raised when a handshake asks for an interactive login; cleared by a forced retry or abandonment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub backend_id: String,
    /// 远程端点（进程后端为空） / Remote endpoint, empty for process backends
    pub endpoint: Option<String>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl AuthChallenge {
    pub fn new(backend_id: impl Into<String>, endpoint: Option<String>, message: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            endpoint,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// 状态变化事件 / State transition event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateEvent {
    pub backend_id: String,
    pub state: LifecycleState,
}

/// UI轮询用的状态快照 / Status snapshot for UI polling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub needs_auth: bool,
}
