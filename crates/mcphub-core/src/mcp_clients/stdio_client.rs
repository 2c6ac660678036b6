/*!
* 文件名: stdio_client.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json
* 描述: STDIO类型的MCP客户端实现 / STDIO MCP client
*/

use super::base::BackendConnection;
use super::model::StdioServerParameters;
use crate::errors::ConnectError;
use async_trait::async_trait;
use mcphub_proto::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// STDIO MCP客户端 / STDIO MCP client
///
/// 每行一个JSON-RPC消息。后台任务读取stdout并按ID分发响应。
/// One JSON-RPC message per line. A background task reads stdout and dispatches responses by id.
pub struct StdioMCPClient {
    backend_id: String,
    params: StdioServerParameters,
    /// 子进程 / Child process
    child: Mutex<Option<Child>>,
    stdin: SharedStdin,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    exited: watch::Receiver<bool>,
    next_id: AtomicI64,
    request_timeout: Duration,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioMCPClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioMCPClient")
            .field("backend_id", &self.backend_id)
            .field("command", &self.params.command)
            .field("args", &self.params.args)
            .finish()
    }
}

impl StdioMCPClient {
    /// 启动子进程 / Spawn the child process
    pub async fn spawn(
        backend_id: &str,
        params: StdioServerParameters,
        request_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args);
        for (key, value) in &params.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Starting command for {}: {} {:?}", backend_id, params.command, params.args);
        let mut child = cmd.spawn().map_err(|e| {
            ConnectError::ProcessError(format!("Failed to start '{}': {}", params.command, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectError::ProcessError("stdout was not captured".to_string()))?;
        let stdin: SharedStdin = Arc::new(Mutex::new(child.stdin.take()));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (exit_tx, exited) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(read_stdout(
            backend_id.to_string(),
            stdout,
            pending.clone(),
            stdin.clone(),
            closed.clone(),
            exit_tx,
        ))];
        if let Some(stderr) = child.stderr.take() {
            tasks.push(tokio::spawn(log_stderr(backend_id.to_string(), stderr)));
        }

        info!("Started process for backend {} (pid {:?})", backend_id, child.id());
        Ok(Self {
            backend_id: backend_id.to_string(),
            params,
            child: Mutex::new(Some(child)),
            stdin,
            pending,
            closed,
            exited,
            next_id: AtomicI64::new(1),
            request_timeout,
            tasks: std::sync::Mutex::new(tasks),
        })
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for StdioMCPClient {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn write_line<T: Serialize>(stdin: &Mutex<Option<ChildStdin>>, message: &T) -> Result<(), ConnectError> {
    let line = serde_json::to_string(message)?;
    let mut guard = stdin.lock().await;
    let stdin = guard.as_mut().ok_or(ConnectError::NotConnected)?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    debug!("Sent: {}", line);
    Ok(())
}

async fn read_stdout(
    backend_id: String,
    stdout: ChildStdout,
    pending: PendingMap,
    stdin: SharedStdin,
    closed: Arc<AtomicBool>,
    exited: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcMessage>(line) {
                    Ok(JsonRpcMessage::Response(response)) => {
                        let Some(id) = response.id.clone() else {
                            warn!("{} sent a response without id: {}", backend_id, line);
                            continue;
                        };
                        match pending.lock().await.remove(&id) {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => debug!("{} answered unknown request {}", backend_id, id),
                        }
                    }
                    Ok(JsonRpcMessage::Request(request)) => match request.id.clone() {
                        // 后端发起的请求：只回应ping
                        Some(id) => {
                            let reply = if request.method == "ping" {
                                JsonRpcResponse::success(Some(id), Value::Object(Default::default()))
                            } else {
                                JsonRpcResponse::failure(Some(id), JsonRpcError::method_not_found(&request.method))
                            };
                            if let Err(e) = write_line(&stdin, &reply).await {
                                debug!("Failed to answer {} from {}: {}", request.method, backend_id, e);
                            }
                        }
                        None => debug!("Notification from {}: {}", backend_id, request.method),
                    },
                    Err(_) => debug!("Ignoring non JSON-RPC output from {}: {}", backend_id, line),
                }
            }
            Ok(None) => {
                info!("Backend {} closed stdout", backend_id);
                break;
            }
            Err(e) => {
                warn!("Failed to read from {}: {}", backend_id, e);
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    // 丢弃发送端，等待者立即得到错误
    pending.lock().await.clear();
    exited.send_replace(true);
}

async fn log_stderr(backend_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "mcphub::backend_stderr", "[{}] {}", backend_id, line);
    }
}

#[async_trait]
impl BackendConnection for StdioMCPClient {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(ConnectError::ConnectionError(format!(
                "Backend {} has exited",
                self.backend_id
            )));
        }

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = write_line(&self.stdin, &request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(ConnectError::Rpc),
            Ok(Err(_)) => Err(ConnectError::ConnectionError(format!(
                "Backend {} exited before answering {}",
                self.backend_id, method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ConnectError::TimeoutError(format!(
                    "Backend {} did not answer {} within {:?}",
                    self.backend_id, method, self.request_timeout
                )))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectError> {
        write_line(&self.stdin, &JsonRpcRequest::notification(method, params)).await
    }

    /// 关闭stdin，等待进程退出，超时则强制终止
    /// Close stdin, wait for the process to exit, kill it when the grace period runs out
    async fn shutdown(&self, grace: Duration) -> Result<(), ConnectError> {
        self.stdin.lock().await.take();
        let child = self.child.lock().await.take();

        let result = match child {
            None => Ok(()),
            Some(mut process) => match tokio::time::timeout(grace, process.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Backend {} exited with {}", self.backend_id, status);
                    Ok(())
                }
                Ok(Err(e)) => Err(ConnectError::ProcessError(e.to_string())),
                Err(_) => {
                    warn!("Backend {} did not exit within {:?}, killing it", self.backend_id, grace);
                    if let Err(e) = process.kill().await {
                        error!("Failed to kill backend {}: {}", self.backend_id, e);
                    }
                    Err(ConnectError::DisconnectTimeout(grace))
                }
            },
        };

        self.abort_tasks();
        result
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn params(command: &str, args: &[&str]) -> StdioServerParameters {
        StdioServerParameters {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn test_spawn_invalid_command() {
        let result = StdioMCPClient::spawn(
            "bad",
            params("nonexistent_command_12345", &[]),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ConnectError::ProcessError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_fails_when_process_exits() {
        let client = StdioMCPClient::spawn("t", params("true", &[]), Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.request("initialize", None).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectError::ConnectionError(_) | ConnectError::NotConnected
        ));
        let mut closed = client.closed();
        tokio::time::timeout(Duration::from_secs(5), closed.wait_for(|c| *c))
            .await
            .unwrap()
            .unwrap();
        client.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_times_out_on_silent_process() {
        let client = StdioMCPClient::spawn("t", params("sleep", &["10"]), Duration::from_millis(100))
            .await
            .unwrap();
        let err = client.request("initialize", None).await.unwrap_err();
        assert!(matches!(err, ConnectError::TimeoutError(_)));

        // sleep ignores stdin EOF, so shutdown has to kill it
        let result = client.shutdown(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ConnectError::DisconnectTimeout(_))));
    }
}
