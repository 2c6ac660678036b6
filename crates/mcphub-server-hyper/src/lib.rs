/*!
* 文件名: lib.rs
* 作者: JQQ
* 创建日期: 2026/01/05
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: None
* 描述: 基于Hyper的MCP集线器HTTP端点 / Hyper-based HTTP endpoint of the MCP hub
*/

pub mod error;
pub mod file_store;
pub mod handler;
pub mod server;

pub use error::{ServerError, ServerResult};
pub use file_store::JsonFileStore;
pub use handler::{ClientSession, HubRoute, HubService};
pub use server::{HubServer, HubServerBuilder, ServerHandle};
