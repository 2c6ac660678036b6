/*!
* 文件名: runtime.rs
* 作者: JQQ
* 创建日期: 2025/12/17
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, futures, async-trait, tracing
* 描述: 运行时依赖检测 / Runtime dependency checker
*/

use crate::registry::BackendDescriptor;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// 运行时探测 / Probe telling whether a runtime is installed
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    async fn is_installed(&self, runtime: &str) -> bool;
}

/// 通过执行 `<binary> --version` 探测 / Probe that runs `<binary> --version`
///
/// 能启动即视为已安装，不关心退出码。
/// A binary that can be spawned counts as installed, whatever its exit code.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 候选可执行文件 / Candidate executables for a runtime name
    pub fn candidates(runtime: &str) -> Vec<String> {
        let names: &[&str] = match runtime {
            "python" => &["python3", "python"],
            "node" | "nodejs" => &["node"],
            "npm" => &["npm"],
            "npx" => &["npx"],
            "uv" => &["uv"],
            "uvx" => &["uvx", "uv"],
            "docker" => &["docker"],
            "deno" => &["deno"],
            "bun" => &["bun"],
            other => return vec![other.to_string()],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn spawnable(&self, binary: &str) -> bool {
        let mut command = Command::new(binary);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!("{} not runnable: {}", binary, e);
                return false;
            }
        };
        if tokio::time::timeout(self.timeout, child.wait()).await.is_err() {
            debug!("{} --version did not exit in time, counting it as present", binary);
        }
        true
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl RuntimeProbe for CommandProbe {
    async fn is_installed(&self, runtime: &str) -> bool {
        for candidate in Self::candidates(runtime) {
            if self.spawnable(&candidate).await {
                return true;
            }
        }
        false
    }
}

/// 运行时检测器 / Runtime checker
///
/// 结果被缓存，直到显式失效。
/// Results are cached until explicitly invalidated.
pub struct RuntimeChecker {
    probe: Arc<dyn RuntimeProbe>,
    runtimes: RwLock<Vec<String>>,
    cache: RwLock<HashMap<String, bool>>,
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl RuntimeChecker {
    pub fn new(runtimes: Vec<String>) -> Self {
        Self::with_probe(Arc::new(CommandProbe::default()), runtimes)
    }

    pub fn with_probe(probe: Arc<dyn RuntimeProbe>, runtimes: Vec<String>) -> Self {
        Self {
            probe,
            runtimes: RwLock::new(runtimes.iter().map(|r| normalize(r)).collect()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 检测所有已知运行时 / Check every known runtime
    ///
    /// 只探测缓存里没有的运行时，探测并行执行。
    /// Only runtimes missing from the cache are probed, in parallel.
    pub async fn check_all(&self) -> HashMap<String, bool> {
        let runtimes = self.runtimes.read().unwrap_or_else(|e| e.into_inner()).clone();
        self.probe_uncached(runtimes).await;
        self.cached()
    }

    async fn probe_uncached(&self, runtimes: Vec<String>) {
        let unknown: Vec<String> = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            runtimes.into_iter().filter(|r| !cache.contains_key(r)).collect()
        };

        if !unknown.is_empty() {
            let probes = unknown.iter().map(|runtime| async move {
                (runtime.clone(), self.probe.is_installed(runtime).await)
            });
            let results = join_all(probes).await;
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            for (runtime, installed) in results {
                debug!("Runtime {} installed: {}", runtime, installed);
                cache.insert(runtime, installed);
            }
        }
    }

    /// 追加并检测指定运行时 / Register and check additional runtimes
    ///
    /// 只探测给定的运行时。
    /// Only the given runtimes are probed.
    pub async fn check_runtimes(&self, names: &[String]) -> HashMap<String, bool> {
        let normalized: Vec<String> = names.iter().map(|n| normalize(n)).collect();
        {
            let mut runtimes = self.runtimes.write().unwrap_or_else(|e| e.into_inner());
            for name in &normalized {
                if !runtimes.contains(name) {
                    runtimes.push(name.clone());
                }
            }
        }
        self.probe_uncached(normalized).await;
        let all = self.cached();
        names
            .iter()
            .map(|n| (n.clone(), all.get(&normalize(n)).copied().unwrap_or(false)))
            .collect()
    }

    /// 清空缓存 / Drop the cache
    pub fn invalidate(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// 缓存的结果 / Cached results
    pub fn cached(&self) -> HashMap<String, bool> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 描述符缺失的运行时 / Runtimes a descriptor needs that are known to be missing
    ///
    /// 纯缓存查询：未检测过的运行时不算缺失。
    /// Pure cache lookup: runtimes never checked are not reported.
    pub fn missing_runtimes_for(&self, descriptor: &BackendDescriptor) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        descriptor
            .runtimes
            .iter()
            .filter(|r| cache.get(&normalize(r)) == Some(&false))
            .cloned()
            .collect()
    }
}
