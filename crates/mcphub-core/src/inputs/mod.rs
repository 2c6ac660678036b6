/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 输入占位符处理 / Input placeholder handling
*/

pub mod render;

pub use render::{referenced_inputs, render_descriptor, ConfigRender};
