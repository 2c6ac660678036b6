/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/19
* 最后修改日期: 2026/01/14
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 生命周期管理模块 / Lifecycle supervisor module
*/

pub mod state;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use state::{AuthChallenge, BackendStatus, LifecycleState, StateEvent};
pub use supervisor::Supervisor;
