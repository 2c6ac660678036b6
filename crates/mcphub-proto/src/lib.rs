/*!
* 文件名: lib.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/08
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde, serde_json, thiserror
* 描述: MCP线协议类型与常量 / MCP wire protocol types and constants
*/

pub mod jsonrpc;
pub mod model;

pub use jsonrpc::*;
pub use model::*;

/// 默认协议版本 / Latest protocol version spoken by the hub
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// 支持的协议版本（新到旧） / Supported protocol versions, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// MCP端点路径段 / Path segment every MCP endpoint ends with
pub const MCP_PATH_SEGMENT: &str = "mcp";

/// 会话ID头 / Streamable HTTP session header
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// 默认监听端口 / Default listening port
pub const DEFAULT_PORT: u16 = 7195;

/// 协商协议版本 / Negotiate protocol version
///
/// 客户端请求的版本受支持时原样返回，否则返回最新版本。
/// Echoes the requested version when supported, otherwise answers with the latest one.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|req| {
            SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .find(|supported| **supported == req)
                .copied()
        })
        .unwrap_or(PROTOCOL_VERSION)
}
