/*!
* 文件名: config.rs
* 作者: JQQ
* 创建日期: 2025/12/18
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde, serde_json, async-trait, tokio
* 描述: 集线器配置与键值配置存储 / Hub configuration and keyed config store
*/

use crate::errors::{HubError, HubResult};
use async_trait::async_trait;
use mcphub_proto::DEFAULT_PORT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// 后端描述符列表的存储键 / Store key of the backend descriptor list
pub const BACKENDS_KEY: &str = "backends";
/// 配置档列表的存储键 / Store key of the profile list
pub const PROFILES_KEY: &str = "profiles";
/// 集线器设置的存储键 / Store key of the hub settings
pub const HUB_KEY: &str = "hub";

/// 工具名冲突策略 / Tool-name collision policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// 先注册的后端胜出 / The backend registered first wins
    #[default]
    FirstRegistered,
    /// 所有工具以 `<backend>__<tool>` 暴露 / Every tool is exposed as `<backend>__<tool>`
    PrefixBackend,
}

/// 集线器设置 / Hub settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// 监听地址 / Listen host
    pub host: String,
    /// 监听端口 / Listen port
    pub port: u16,
    /// 握手超时 / Handshake timeout
    pub connect_timeout_ms: u64,
    /// 优雅关闭宽限期 / Graceful shutdown grace period
    pub disconnect_grace_ms: u64,
    /// 转发请求超时 / Forwarded request timeout
    pub request_timeout_ms: u64,
    /// 客户端会话空闲超时 / Idle timeout of client sessions
    pub session_idle_timeout_ms: u64,
    /// 初始化时自动启动已启用后端 / Auto-start enabled backends on initialize
    pub auto_start: bool,
    pub collision_policy: CollisionPolicy,
    /// 需要检测的运行时 / Runtimes inspected by the dependency checker
    pub runtimes: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 30_000,
            disconnect_grace_ms: 5_000,
            request_timeout_ms: 60_000,
            session_idle_timeout_ms: 30 * 60_000,
            auto_start: true,
            collision_policy: CollisionPolicy::FirstRegistered,
            runtimes: ["node", "npx", "python", "uv", "uvx", "docker"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl HubConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.session_idle_timeout_ms)
    }

    /// 从存储加载，缺失时使用默认值 / Load from the store, defaults when absent
    pub async fn load(store: &dyn ConfigStore) -> HubResult<Self> {
        Ok(load_typed(store, HUB_KEY).await?.unwrap_or_default())
    }
}

/// 键值配置存储 / Keyed configuration store
///
/// 核心只把它当作简单的 get/set 存储，持久化格式由实现方决定。
/// The core treats it as a plain get/set store; the persistence format belongs to the implementor.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 读取值 / Read a value
    async fn get(&self, key: &str) -> HubResult<Option<Value>>;

    /// 写入值 / Write a value
    async fn set(&self, key: &str, value: Value) -> HubResult<()>;
}

/// 内存配置存储 / In-memory config store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个值 / Seed a value
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.get_mut().insert(key.into(), value);
        self
    }

    /// 当前所有值的副本 / Copy of every stored value
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> HubResult<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> HubResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// 读取并反序列化 / Read and deserialize a typed value
pub async fn load_typed<T: DeserializeOwned>(
    store: &dyn ConfigStore,
    key: &str,
) -> HubResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HubError::Store(format!("Failed to decode '{}': {}", key, e))),
        None => Ok(None),
    }
}

/// 序列化并写入 / Serialize and write a typed value
pub async fn save_typed<T: Serialize>(store: &dyn ConfigStore, key: &str, value: &T) -> HubResult<()> {
    store.set(key, serde_json::to_value(value)?).await
}
