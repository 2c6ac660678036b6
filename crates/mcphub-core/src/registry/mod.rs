/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/16
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 后端注册表模块 / Backend registry module
*/

pub mod model;
#[allow(clippy::module_inception)]
pub mod registry;

pub use model::{
    slugify, validate_backend_id, BackendDescriptor, InputField, Origin, RawBackendEntry, TransportSpec,
};
pub use registry::BackendRegistry;
