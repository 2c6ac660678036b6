/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/20
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 配置档路由模块 / Profile routing module
*/

pub mod merge;
pub mod model;
pub mod router;

pub use merge::{merge_catalogues, MergedCatalogue, Route, PREFIX_SEPARATOR};
pub use model::{Profile, RESERVED_PROFILE_IDS};
pub use router::{client_config_snippet, url_for, ProfileRouter};
