/*!
* 文件名: mod.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: 无
* 描述: 后端MCP客户端 / Backend MCP clients
*/

pub mod base;
pub mod http_client;
pub mod model;
pub mod session;
pub mod stdio_client;
pub mod utils;

pub use base::{BackendConnection, Connector};
pub use http_client::HttpMCPClient;
pub use model::{ConnectOptions, ServerParameters, StdioServerParameters, StreamableHttpParameters};
pub use stdio_client::StdioMCPClient;
pub use utils::{client_factory, TransportConnector};
