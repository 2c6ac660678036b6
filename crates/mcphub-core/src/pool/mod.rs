/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/18
* 最后修改日期: 2026/01/14
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 连接池模块 / Connection pool module
*/

#[allow(clippy::module_inception)]
pub mod pool;

pub use pool::{ConnectionPool, PoolOptions, RunningConnection};
