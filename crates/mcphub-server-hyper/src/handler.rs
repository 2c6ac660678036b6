/*!
* 文件名: handler.rs
* 作者: JQQ
* 创建日期: 2026/01/05
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: hyper, http-body-util, serde_json, dashmap, uuid
* 描述: MCP请求路由与分发 / MCP request routing and dispatch
*/

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use mcphub_core::errors::ConnectError;
use mcphub_core::{HubError, LifecycleState, McpHub, MergedCatalogue};
use mcphub_proto::{
    negotiate_protocol_version, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PATH_SEGMENT,
    SESSION_ID_HEADER,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type HubResponse = Response<Full<Bytes>>;

/// 解析后的路径 / Parsed request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubRoute {
    /// `/mcp` 或 `/{profile}/mcp` / `/mcp` or `/{profile}/mcp`
    Mcp(Option<String>),
    Health,
    NotFound,
}

impl HubRoute {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [segment] if *segment == MCP_PATH_SEGMENT => HubRoute::Mcp(None),
            ["health"] => HubRoute::Health,
            [profile, segment] if *segment == MCP_PATH_SEGMENT && !profile.is_empty() => {
                HubRoute::Mcp(Some(profile.to_string()))
            }
            _ => HubRoute::NotFound,
        }
    }
}

/// 客户端会话 / Client session
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub profile: Option<String>,
    pub protocol_version: String,
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ClientSession {
    fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now.signed_duration_since(self.last_seen)
            .to_std()
            .is_ok_and(|idle| idle > idle_timeout)
    }
}

/// 请求处理器 / Request handler
pub struct HubService {
    hub: Arc<McpHub>,
    sessions: DashMap<String, ClientSession>,
    idle_timeout: Duration,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HubResponse {
    let encoded = serde_json::to_vec(body).unwrap_or_else(|e| {
        warn!("Failed to encode response: {}", e);
        b"{}".to_vec()
    });
    let mut response = Response::new(Full::new(Bytes::from(encoded)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn empty_response(status: StatusCode) -> HubResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn method_not_allowed(allow: &'static str) -> HubResponse {
    let mut response = empty_response(StatusCode::METHOD_NOT_ALLOWED);
    response.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    response
}

fn rpc_failure(status: StatusCode, error: JsonRpcError) -> HubResponse {
    json_response(status, &JsonRpcResponse::failure(None, error))
}

/// 后端错误到线上错误的映射 / Map a backend failure onto a wire error
fn forward_error(backend_id: &str, err: ConnectError) -> JsonRpcError {
    if err.needs_auth() {
        return JsonRpcError::auth_required(format!("{} needs authorization: {}", backend_id, err));
    }
    match err {
        ConnectError::Rpc(e) => e,
        ConnectError::NotConnected => {
            JsonRpcError::backend_unavailable(format!("Backend {} is not running", backend_id))
        }
        other => JsonRpcError::internal(format!("{}: {}", backend_id, other)),
    }
}

fn required_str<'a>(request: &'a JsonRpcRequest, key: &str) -> Result<&'a str, JsonRpcError> {
    request
        .param_str(key)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("missing '{}'", key)))
}

fn arguments_of(request: &JsonRpcRequest) -> Value {
    request
        .params
        .as_ref()
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}))
}

impl HubService {
    pub fn new(hub: Arc<McpHub>) -> Self {
        let idle_timeout = hub.config().session_idle_timeout();
        Self {
            hub,
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    pub fn hub(&self) -> &Arc<McpHub> {
        &self.hub
    }

    pub fn session(&self, id: &str) -> Option<ClientSession> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 清理空闲会话，返回清理数量 / Drop idle sessions; returns how many were dropped
    pub fn expire_idle_sessions(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_idle(now, self.idle_timeout));
        let expired = before.saturating_sub(self.sessions.len());
        if expired > 0 {
            info!("Expired {} idle client sessions", expired);
        }
        expired
    }

    /// 刷新会话的活跃时间，过期或未知时返回false / Touch a session; false when unknown or expired
    fn touch_session(&self, id: &str) -> bool {
        let now = Utc::now();
        if let Some(mut session) = self.sessions.get_mut(id) {
            if !session.is_idle(now, self.idle_timeout) {
                session.last_seen = now;
                return true;
            }
        }
        if self.sessions.remove(id).is_some() {
            debug!("Client session {} expired", id);
        }
        false
    }

    /// 处理一个HTTP请求 / Handle one HTTP request
    pub async fn handle(&self, req: Request<Incoming>) -> Result<HubResponse, Infallible> {
        let (parts, body) = req.into_parts();
        debug!("{} {}", parts.method, parts.uri.path());

        let response = match (HubRoute::parse(parts.uri.path()), &parts.method) {
            (HubRoute::Health, &Method::GET) => self.health().await,
            (HubRoute::Health, _) => method_not_allowed("GET"),
            (HubRoute::Mcp(profile), &Method::POST) => {
                let session_id = parts
                    .headers
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match body.collect().await {
                    Ok(collected) => {
                        self.handle_post(profile, session_id, &collected.to_bytes())
                            .await
                    }
                    Err(e) => rpc_failure(
                        StatusCode::BAD_REQUEST,
                        JsonRpcError::invalid_request(format!("Failed to read body: {}", e)),
                    ),
                }
            }
            (HubRoute::Mcp(_), &Method::DELETE) => {
                let ended = parts
                    .headers
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|id| self.sessions.remove(id));
                if let Some((id, _)) = ended {
                    info!("Client session {} ended", id);
                }
                empty_response(StatusCode::NO_CONTENT)
            }
            (HubRoute::Mcp(_), _) => method_not_allowed("POST, DELETE"),
            (HubRoute::NotFound, _) => empty_response(StatusCode::NOT_FOUND),
        };
        Ok(response)
    }

    async fn health(&self) -> HubResponse {
        let statuses = self.hub.statuses().await;
        let running = statuses
            .iter()
            .filter(|s| s.state == LifecycleState::Running)
            .count();
        json_response(
            StatusCode::OK,
            &json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "running": running,
                "backends": statuses,
            }),
        )
    }

    async fn handle_post(&self, profile: Option<String>, session_id: Option<String>, body: &[u8]) -> HubResponse {
        if let Some(profile_id) = profile.as_deref() {
            if self.hub.router().get_profile(profile_id).is_none() {
                return rpc_failure(
                    StatusCode::NOT_FOUND,
                    JsonRpcError::invalid_request(format!("Profile not found: {}", profile_id)),
                );
            }
        }
        if let Some(id) = session_id.as_deref() {
            if !self.touch_session(id) {
                return rpc_failure(
                    StatusCode::NOT_FOUND,
                    JsonRpcError::invalid_request(format!("Unknown session: {}", id)),
                );
            }
        }

        let message: Value = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => return rpc_failure(StatusCode::BAD_REQUEST, JsonRpcError::parse_error(e.to_string())),
        };

        match message {
            Value::Array(batch) => {
                if batch.is_empty() {
                    return rpc_failure(
                        StatusCode::BAD_REQUEST,
                        JsonRpcError::invalid_request("empty batch"),
                    );
                }
                let mut responses = Vec::new();
                for item in batch {
                    if let Some(response) = self.handle_batched(profile.as_deref(), item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    empty_response(StatusCode::ACCEPTED)
                } else {
                    json_response(StatusCode::OK, &responses)
                }
            }
            single => match self.handle_message(profile.as_deref(), single).await {
                (Some(response), new_session) => {
                    let mut http = json_response(StatusCode::OK, &response);
                    if let Some(id) = new_session.and_then(|id| HeaderValue::from_str(&id).ok()) {
                        http.headers_mut().insert(SESSION_ID_HEADER, id);
                    }
                    http
                }
                (None, _) => empty_response(StatusCode::ACCEPTED),
            },
        }
    }

    /// 批量中的一条消息：initialize 不允许出现在批量中
    /// One batched message; initialize may not be part of a batch
    async fn handle_batched(&self, profile: Option<&str>, message: Value) -> Option<JsonRpcResponse> {
        if message.get("method").and_then(Value::as_str) == Some("initialize") {
            let id = message.get("id").cloned().and_then(|id| serde_json::from_value(id).ok());
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_request("initialize must not be sent in a batch"),
            ));
        }
        self.handle_message(profile, message).await.0
    }

    /// 处理一条JSON-RPC消息，返回响应（通知为None）以及新建的会话ID
    /// Handle one JSON-RPC message; returns the response (None for notifications) and any new session id
    async fn handle_message(&self, profile: Option<&str>, message: Value) -> (Option<JsonRpcResponse>, Option<String>) {
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return (
                    Some(JsonRpcResponse::failure(None, JsonRpcError::invalid_request(e.to_string()))),
                    None,
                )
            }
        };

        if request.is_notification() {
            debug!("Notification {} acknowledged", request.method);
            return (None, None);
        }

        let id = request.id.clone();
        if request.method == "initialize" {
            let (result, session_id) = self.initialize(profile, &request);
            return (Some(JsonRpcResponse::success(id, result)), Some(session_id));
        }

        let outcome = self.dispatch(profile, &request).await;
        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!("{} failed: {}", request.method, error);
                JsonRpcResponse::failure(id, error)
            }
        };
        (Some(response), None)
    }

    fn initialize(&self, profile: Option<&str>, request: &JsonRpcRequest) -> (Value, String) {
        let version = negotiate_protocol_version(request.param_str("protocolVersion"));
        let client_name = request
            .params
            .as_ref()
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        info!(
            "Client {} initialized session {} on {}",
            client_name.as_deref().unwrap_or("unknown"),
            session_id,
            profile.unwrap_or("default profile")
        );
        self.sessions.insert(
            session_id.clone(),
            ClientSession {
                profile: profile.map(str::to_string),
                protocol_version: version.to_string(),
                client_name,
                created_at: now,
                last_seen: now,
            },
        );

        let result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {},
                "prompts": {},
            },
            "serverInfo": {"name": "mcphub", "version": env!("CARGO_PKG_VERSION")},
        });
        (result, session_id)
    }

    async fn view(&self, profile: Option<&str>) -> Result<MergedCatalogue, JsonRpcError> {
        self.hub.view(profile).await.map_err(|e| match e {
            HubError::ProfileNotFound(id) => JsonRpcError::invalid_request(format!("Profile not found: {}", id)),
            other => JsonRpcError::internal(other.to_string()),
        })
    }

    async fn dispatch(&self, profile: Option<&str>, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let pool = self.hub.pool();
        match request.method.as_str() {
            "ping" => Ok(json!({})),
            "tools/list" => {
                let view = self.view(profile).await?;
                Ok(json!({ "tools": view.tools }))
            }
            "tools/call" => {
                let name = required_str(request, "name")?;
                let view = self.view(profile).await?;
                let route = view
                    .route_tool(name)
                    .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", name)))?;
                debug!("Routing tool {} to {}", name, route.backend_id);
                pool.call_tool(&route.backend_id, &route.name, arguments_of(request))
                    .await
                    .map_err(|e| forward_error(&route.backend_id, e))
            }
            "resources/list" => {
                let view = self.view(profile).await?;
                Ok(json!({ "resources": view.resources }))
            }
            "resources/read" => {
                let uri = required_str(request, "uri")?;
                let view = self.view(profile).await?;
                let backend_id = view
                    .route_resource(uri)
                    .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown resource: {}", uri)))?;
                pool.read_resource(backend_id, uri)
                    .await
                    .map_err(|e| forward_error(backend_id, e))
            }
            "prompts/list" => {
                let view = self.view(profile).await?;
                Ok(json!({ "prompts": view.prompts }))
            }
            "prompts/get" => {
                let name = required_str(request, "name")?;
                let view = self.view(profile).await?;
                let route = view
                    .route_prompt(name)
                    .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown prompt: {}", name)))?;
                pool.get_prompt(&route.backend_id, &route.name, arguments_of(request))
                    .await
                    .map_err(|e| forward_error(&route.backend_id, e))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}
