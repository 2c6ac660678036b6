/*!
* 文件名: lib.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: None
* 描述: MCP后端生命周期管理与配置档路由 / MCP backend lifecycle supervision and profile routing
*/

pub mod config;
pub mod errors;
pub mod hub;
pub mod inputs;
pub mod mcp_clients;
pub mod pool;
pub mod profiles;
pub mod registry;
pub mod runtime;
pub mod supervisor;

pub use config::{CollisionPolicy, ConfigStore, HubConfig, MemoryConfigStore};
pub use errors::{ConnectError, HubError, HubResult, LifecycleError};
pub use hub::{McpHub, McpHubBuilder};
pub use pool::{ConnectionPool, PoolOptions};
pub use profiles::{MergedCatalogue, Profile, ProfileRouter};
pub use registry::{BackendDescriptor, BackendRegistry, Origin, TransportSpec};
pub use runtime::{CommandProbe, RuntimeChecker, RuntimeProbe};
pub use supervisor::{AuthChallenge, BackendStatus, LifecycleState, Supervisor};

/// 核心模块的版本号 / Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
