/*!
* 文件名: http_client.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, reqwest, serde_json
* 描述: Streamable HTTP类型的MCP客户端实现 / Streamable HTTP MCP client
*/

use super::base::BackendConnection;
use super::model::StreamableHttpParameters;
use crate::errors::ConnectError;
use async_trait::async_trait;
use mcphub_proto::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId, SESSION_ID_HEADER};
use reqwest::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Streamable HTTP MCP客户端 / Streamable HTTP MCP client
pub struct HttpMCPClient {
    backend_id: String,
    params: StreamableHttpParameters,
    /// HTTP客户端 / HTTP client
    http_client: Client,
    /// 会话ID / Session ID
    session_id: Mutex<Option<String>>,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl std::fmt::Debug for HttpMCPClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMCPClient")
            .field("backend_id", &self.backend_id)
            .field("url", &self.params.url)
            .finish()
    }
}

impl HttpMCPClient {
    /// 创建新的HTTP客户端 / Create new HTTP client
    pub fn new(
        backend_id: &str,
        params: StreamableHttpParameters,
        request_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| ConnectError::ConnectionError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            backend_id: backend_id.to_string(),
            params,
            http_client,
            session_id: Mutex::new(None),
            next_id: AtomicI64::new(1),
            request_timeout,
        })
    }

    /// 当前会话ID / Current session id
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    fn builder(&self, method: reqwest::Method, session_id: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self.http_client.request(method, &self.params.url);
        for (key, value) in &self.params.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(session_id) = session_id {
            request = request.header(SESSION_ID_HEADER, session_id);
        }
        request
    }

    /// 发送一条消息，返回匹配的响应（通知时为None）
    /// Post one message and return its matching response (None for notifications)
    async fn post(&self, message: &JsonRpcRequest) -> Result<Option<JsonRpcResponse>, ConnectError> {
        let session_id = self.session_id().await;
        let response = self
            .builder(reqwest::Method::POST, session_id.as_deref())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConnectError::TimeoutError(format!("{} timed out: {}", self.params.url, e))
                } else {
                    ConnectError::ConnectionError(format!("Failed to reach {}: {}", self.params.url, e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(" ({})", v))
                .unwrap_or_default();
            return Err(ConnectError::AuthRequired(format!(
                "{} answered {}{}",
                self.params.url, status, challenge
            )));
        }

        if let Some(new_session) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.lock().await;
            if current.as_deref() != Some(new_session) {
                debug!("Backend {} assigned session {}", self.backend_id, new_session);
                *current = Some(new_session.to_string());
            }
        }

        if status == StatusCode::ACCEPTED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ConnectError::ConnectionError(format!(
                "HTTP error {} from {}",
                status, self.params.url
            )));
        }
        let Some(id) = message.id.as_ref() else {
            return Ok(None);
        };

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| ConnectError::ConnectionError(format!("Failed to read body: {}", e)))?;

        if is_event_stream {
            parse_sse_response(&body, id).map(Some).ok_or_else(|| {
                ConnectError::ProtocolError(format!("event stream carried no response to request {}", id))
            })
        } else {
            let response: JsonRpcResponse = serde_json::from_str(&body)?;
            Ok(Some(response))
        }
    }
}

/// 从SSE正文中找出指定ID的响应 / Find the response with the given id in an SSE body
pub(crate) fn parse_sse_response(body: &str, id: &RequestId) -> Option<JsonRpcResponse> {
    let normalized = body.replace("\r\n", "\n");
    for event in normalized.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();
        if data.is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonRpcMessage>(&data.join("\n")) {
            Ok(JsonRpcMessage::Response(response)) if response.id.as_ref() == Some(id) => {
                return Some(response);
            }
            Ok(_) => continue,
            Err(e) => debug!("Skipping undecodable SSE event: {}", e),
        }
    }
    None
}

#[async_trait]
impl BackendConnection for HttpMCPClient {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        match self.post(&request).await? {
            Some(response) => response.into_result().map_err(ConnectError::Rpc),
            None => Err(ConnectError::ProtocolError(format!(
                "{} accepted {} without answering",
                self.params.url, method
            ))),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectError> {
        self.post(&JsonRpcRequest::notification(method, params)).await?;
        Ok(())
    }

    /// 结束会话（DELETE） / Terminate the session with DELETE
    async fn shutdown(&self, grace: Duration) -> Result<(), ConnectError> {
        let Some(session_id) = self.session_id.lock().await.take() else {
            return Ok(());
        };
        let result = self
            .builder(reqwest::Method::DELETE, Some(&session_id))
            .timeout(grace)
            .send()
            .await;
        match result {
            Ok(response) => {
                info!("Closed session of {} ({})", self.backend_id, response.status());
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(ConnectError::DisconnectTimeout(grace)),
            Err(e) => {
                // 服务器可能已不可达，会话视为结束
                warn!("Failed to close session of {}: {}", self.backend_id, e);
                Ok(())
            }
        }
    }

    fn kind(&self) -> &'static str {
        "streamable_http"
    }
}
