/*!
* 文件名: session.rs
* 作者: JQQ
* 创建日期: 2025/12/18
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde_json, tracing
* 描述: MCP握手与能力目录获取 / MCP handshake and capability catalogue fetch
*/

use super::base::BackendConnection;
use crate::errors::ConnectError;
use mcphub_proto::{
    codes, CapabilityCatalogue, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    Prompt, Resource, Tool, PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// 单次分页列举的最大页数 / Upper bound of pages fetched for one listing
const MAX_PAGES: usize = 100;

/// 发送initialize并确认 / Send initialize and acknowledge it
pub async fn initialize(conn: &dyn BackendConnection) -> Result<InitializeResult, ConnectError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "mcphub",
            "version": env!("CARGO_PKG_VERSION"),
        }
    });
    let value = conn.request("initialize", Some(params)).await?;
    let result: InitializeResult = serde_json::from_value(value)
        .map_err(|e| ConnectError::ProtocolError(format!("Invalid initialize result: {}", e)))?;
    conn.notify("notifications/initialized", None).await?;
    debug!(
        "Initialized {} {} (protocol {})",
        result.server_info.name, result.server_info.version, result.protocol_version
    );
    Ok(result)
}

trait Paged: DeserializeOwned {
    type Item;
    fn split(self) -> (Vec<Self::Item>, Option<String>);
}

impl Paged for ListToolsResult {
    type Item = Tool;
    fn split(self) -> (Vec<Tool>, Option<String>) {
        (self.tools, self.next_cursor)
    }
}

impl Paged for ListResourcesResult {
    type Item = Resource;
    fn split(self) -> (Vec<Resource>, Option<String>) {
        (self.resources, self.next_cursor)
    }
}

impl Paged for ListPromptsResult {
    type Item = Prompt;
    fn split(self) -> (Vec<Prompt>, Option<String>) {
        (self.prompts, self.next_cursor)
    }
}

/// 跟随nextCursor列出全部条目 / List every item, following nextCursor
///
/// 后端不支持该方法时返回空列表。
/// A backend that does not implement the method yields an empty list.
async fn list_all<P: Paged>(conn: &dyn BackendConnection, method: &str) -> Result<Vec<P::Item>, ConnectError> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
        let value = match conn.request(method, params).await {
            Ok(value) => value,
            Err(ConnectError::Rpc(err)) if err.code == codes::METHOD_NOT_FOUND => {
                debug!("Backend does not implement {}", method);
                return Ok(items);
            }
            Err(e) => return Err(e),
        };
        let page: P = serde_json::from_value(value)
            .map_err(|e| ConnectError::ProtocolError(format!("Invalid {} result: {}", method, e)))?;
        let (page_items, next) = page.split();
        items.extend(page_items);
        match next {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(items),
        }
    }
    warn!("{} returned more than {} pages, truncating", method, MAX_PAGES);
    Ok(items)
}

/// 获取能力目录 / Fetch the capability catalogue
///
/// 只查询后端声明的能力；没有任何声明时仍尝试 tools/list。
/// Only declared capabilities are queried; with no declaration at all tools/list is still tried.
pub async fn fetch_catalogue(
    conn: &dyn BackendConnection,
    init: &InitializeResult,
) -> Result<CapabilityCatalogue, ConnectError> {
    let caps = &init.capabilities;
    let nothing_declared = caps.tools.is_none() && caps.resources.is_none() && caps.prompts.is_none();

    let tools = if caps.tools.is_some() || nothing_declared {
        list_all::<ListToolsResult>(conn, "tools/list").await?
    } else {
        Vec::new()
    };
    let resources = if caps.resources.is_some() {
        list_all::<ListResourcesResult>(conn, "resources/list").await?
    } else {
        Vec::new()
    };
    let prompts = if caps.prompts.is_some() {
        list_all::<ListPromptsResult>(conn, "prompts/list").await?
    } else {
        Vec::new()
    };

    Ok(CapabilityCatalogue {
        server_info: Some(init.server_info.clone()),
        protocol_version: Some(init.protocol_version.clone()),
        tools,
        resources,
        prompts,
    })
}

/// 调用工具 / Call a tool
pub async fn call_tool(conn: &dyn BackendConnection, name: &str, arguments: Value) -> Result<Value, ConnectError> {
    conn.request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
        .await
}

/// 读取资源 / Read a resource
pub async fn read_resource(conn: &dyn BackendConnection, uri: &str) -> Result<Value, ConnectError> {
    conn.request("resources/read", Some(json!({ "uri": uri }))).await
}

/// 获取提示 / Get a prompt
pub async fn get_prompt(conn: &dyn BackendConnection, name: &str, arguments: Value) -> Result<Value, ConnectError> {
    conn.request("prompts/get", Some(json!({ "name": name, "arguments": arguments })))
        .await
}
