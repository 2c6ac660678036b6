/*!
* 文件名: model.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde
* 描述: 渲染后的连接参数 / Rendered connection parameters
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Stdio服务器参数 / Stdio server parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioServerParameters {
    /// 命令 / Command
    pub command: String,
    /// 参数 / Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// 环境变量 / Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// 工作目录 / Working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Streamable HTTP服务器参数 / Streamable HTTP server parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamableHttpParameters {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// 占位符代入后的连接参数 / Connection parameters with every placeholder substituted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerParameters {
    Stdio(StdioServerParameters),
    StreamableHttp(StreamableHttpParameters),
}

impl ServerParameters {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerParameters::Stdio(_) => "stdio",
            ServerParameters::StreamableHttp(_) => "streamable_http",
        }
    }
}

/// 打开连接时的选项 / Options applied when opening a connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// 单个请求的超时 / Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}
