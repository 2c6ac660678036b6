/*!
* 文件名: jsonrpc.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/08
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde, serde_json, thiserror
* 描述: JSON-RPC 2.0 消息定义 / JSON-RPC 2.0 message definitions
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC版本号 / JSON-RPC version tag
pub const JSONRPC_VERSION: &str = "2.0";

/// 错误码 / Error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// 后端需要授权 / Backend requires interactive authorization
    pub const AUTH_REQUIRED: i64 = -32001;
    /// 后端不可用 / Backend not running or unreachable
    pub const BACKEND_UNAVAILABLE: i64 = -32002;
}

/// 请求ID / Request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

/// JSON-RPC请求或通知 / JSON-RPC request or notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// 创建请求 / Create request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// 创建通知（无ID） / Create notification (no id)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// 读取参数字段 / Read a string field from params
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// JSON-RPC响应 / JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// 解析失败时为null / null when the request could not be parsed
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// 转换为Result / Convert into a Result
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// JSON-RPC错误对象 / JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(codes::AUTH_REQUIRED, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::BACKEND_UNAVAILABLE, message)
    }

    /// 是否为授权错误 / Whether the error signals an authorization requirement
    ///
    /// 部分后端不使用专用错误码，只在消息里写 "unauthorized"。
    /// Some backends do not use the dedicated code and only say "unauthorized" in the message.
    pub fn is_auth_required(&self) -> bool {
        if self.code == codes::AUTH_REQUIRED {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("unauthorized")
            || message.contains("authorization required")
            || message.contains("authentication required")
    }
}

/// 后端流上的消息 / A message read from a backend stream
///
/// Request放在前面：响应没有 `method` 字段，反过来却可以被宽松地解析成响应。
/// Request goes first: a response has no `method`, while a request would loosely parse as a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_has_no_id() {
        let n = JsonRpcRequest::notification("notifications/initialized", None);
        let encoded = serde_json::to_value(&n).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert!(n.is_notification());
    }

    #[test]
    fn test_message_discriminates_request_and_response() {
        let req: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(_)));

        let resp: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "a", "result": {}})).unwrap();
        match resp {
            JsonRpcMessage::Response(r) => assert_eq!(r.id, Some(RequestId::String("a".into()))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_serializes_null_id() {
        let resp = JsonRpcResponse::failure(None, JsonRpcError::parse_error("bad json"));
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded["id"], Value::Null);
        assert_eq!(encoded["error"]["code"], json!(codes::PARSE_ERROR));
        assert!(encoded.get("result").is_none());
    }

    #[test]
    fn test_auth_error_detection() {
        assert!(JsonRpcError::auth_required("login first").is_auth_required());
        assert!(JsonRpcError::internal("401 Unauthorized").is_auth_required());
        assert!(!JsonRpcError::internal("boom").is_auth_required());
    }

    #[test]
    fn test_into_result() {
        let ok = JsonRpcResponse::success(Some(1.into()), json!({"x": 1}));
        assert_eq!(ok.into_result().unwrap(), json!({"x": 1}));

        let err = JsonRpcResponse::failure(Some(1.into()), JsonRpcError::method_not_found("nope"));
        assert_eq!(err.into_result().unwrap_err().code, codes::METHOD_NOT_FOUND);
    }
}
