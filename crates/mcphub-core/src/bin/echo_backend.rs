/*!
* 文件名: echo_backend.rs
* 作者: JQQ
* 创建日期: 2026/01/10
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json
* 描述: 用于冒烟测试的最小stdio MCP后端 / Minimal stdio MCP backend for smoke tests
*
* 用法 / Usage: mcphub-echo-backend [--tool <name>]... [--fail-auth] [--exit-on <tool>]
*/

use mcphub_proto::{
    negotiate_protocol_version, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, Tool,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

struct Options {
    tools: Vec<String>,
    fail_auth: bool,
    /// 调用该工具时不作应答直接退出 / Calling this tool exits without answering
    exit_on: Option<String>,
}

fn parse_args() -> Options {
    let mut options = Options {
        tools: Vec::new(),
        fail_auth: false,
        exit_on: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tool" => {
                if let Some(name) = args.next() {
                    options.tools.push(name);
                }
            }
            "--fail-auth" => options.fail_auth = true,
            "--exit-on" => options.exit_on = args.next(),
            other => eprintln!("ignoring unknown argument {}", other),
        }
    }
    if options.tools.is_empty() {
        options.tools.push("echo".to_string());
    }
    options
}

fn handle(options: &Options, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    match request.method.as_str() {
        "initialize" => {
            if options.fail_auth {
                return Err(JsonRpcError::auth_required("Unauthorized: token missing"));
            }
            Ok(json!({
                "protocolVersion": negotiate_protocol_version(request.param_str("protocolVersion")),
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mcphub-echo-backend", "version": env!("CARGO_PKG_VERSION")},
            }))
        }
        "ping" => Ok(json!({})),
        "tools/list" => {
            let tools: Vec<Tool> = options
                .tools
                .iter()
                .map(|name| Tool::new(name.as_str()).with_description(format!("Echo tool {}", name)))
                .collect();
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let name = request.param_str("name").unwrap_or_default();
            if !options.tools.iter().any(|t| t == name) {
                return Err(JsonRpcError::invalid_params(format!("Unknown tool: {}", name)));
            }
            let arguments = request
                .params
                .as_ref()
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            Ok(json!({
                "content": [{"type": "text", "text": arguments.to_string()}],
                "isError": false,
            }))
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let options = parse_args();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcMessage>(&line) {
            Ok(JsonRpcMessage::Request(request)) if request.is_notification() => continue,
            Ok(JsonRpcMessage::Request(request))
                if request.method == "tools/call"
                    && options.exit_on.is_some()
                    && request.param_str("name") == options.exit_on.as_deref() =>
            {
                return Ok(());
            }
            Ok(JsonRpcMessage::Request(request)) => match handle(&options, &request) {
                Ok(result) => JsonRpcResponse::success(request.id.clone(), result),
                Err(error) => JsonRpcResponse::failure(request.id.clone(), error),
            },
            Ok(JsonRpcMessage::Response(_)) => continue,
            Err(e) => JsonRpcResponse::failure(None, JsonRpcError::parse_error(e.to_string())),
        };
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }
    Ok(())
}
