/*!
* 文件名: hub.rs
* 作者: JQQ
* 创建日期: 2025/12/21
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, tracing
* 描述: 集线器门面：把注册表、检测器、连接池、管理器和路由组装在一起
*       Hub facade wiring registry, runtime checker, pool, supervisor and router together
*/

use crate::config::{ConfigStore, HubConfig};
use crate::errors::{HubError, HubResult, LifecycleError};
use crate::mcp_clients::Connector;
use crate::pool::{ConnectionPool, PoolOptions};
use crate::profiles::{client_config_snippet, url_for, MergedCatalogue, Profile, ProfileRouter};
use crate::registry::{BackendDescriptor, BackendRegistry, Origin};
use crate::runtime::{RuntimeChecker, RuntimeProbe};
use crate::supervisor::{BackendStatus, LifecycleState, Supervisor};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// 集线器构建器 / Hub builder
pub struct McpHubBuilder {
    store: Arc<dyn ConfigStore>,
    config: Option<HubConfig>,
    connector: Option<Arc<dyn Connector>>,
    probe: Option<Arc<dyn RuntimeProbe>>,
}

impl McpHubBuilder {
    /// 覆盖存储中的设置 / Override the settings found in the store
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 自定义连接器 / Custom connector
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 自定义运行时探测 / Custom runtime probe
    pub fn probe(mut self, probe: Arc<dyn RuntimeProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 加载注册表与配置档并组装 / Load registry and profiles and assemble the hub
    pub async fn build(self) -> HubResult<Arc<McpHub>> {
        let config = match self.config {
            Some(config) => config,
            None => HubConfig::load(self.store.as_ref()).await?,
        };

        let options = PoolOptions {
            connect_timeout: config.connect_timeout(),
            disconnect_grace: config.disconnect_grace(),
            request_timeout: config.request_timeout(),
        };
        let pool = Arc::new(match self.connector {
            Some(connector) => ConnectionPool::with_connector(connector, options),
            None => ConnectionPool::new(options),
        });
        let runtime = Arc::new(match self.probe {
            Some(probe) => RuntimeChecker::with_probe(probe, config.runtimes.clone()),
            None => RuntimeChecker::new(config.runtimes.clone()),
        });

        let registry = Arc::new(BackendRegistry::load(self.store.clone()).await?);
        let supervisor = Supervisor::new(registry.clone(), pool.clone());
        let router = Arc::new(ProfileRouter::load(self.store.clone(), registry.clone(), supervisor.clone()).await?);

        Ok(Arc::new(McpHub {
            config,
            registry,
            runtime,
            pool,
            supervisor,
            router,
        }))
    }
}

/// MCP集线器 / MCP hub
///
/// 启动时构建一次，以 `Arc` 句柄在各处共享。
/// Built once at startup and shared as an `Arc` handle.
pub struct McpHub {
    config: HubConfig,
    registry: Arc<BackendRegistry>,
    runtime: Arc<RuntimeChecker>,
    pool: Arc<ConnectionPool>,
    supervisor: Supervisor,
    router: Arc<ProfileRouter>,
}

impl McpHub {
    pub fn builder(store: Arc<dyn ConfigStore>) -> McpHubBuilder {
        McpHubBuilder {
            store,
            config: None,
            connector: None,
            probe: None,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Arc<RuntimeChecker> {
        &self.runtime
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn router(&self) -> &Arc<ProfileRouter> {
        &self.router
    }

    /// 检测运行时并按配置自动启动 / Check runtimes and auto-start per configuration
    pub async fn initialize(&self) -> Vec<(String, Result<(), LifecycleError>)> {
        let declared: Vec<String> = self
            .registry
            .list()
            .await
            .into_iter()
            .flat_map(|d| d.runtimes)
            .collect();
        self.runtime.check_runtimes(&declared).await;
        self.runtime.check_all().await;
        self.supervisor.initialize(self.config.auto_start).await
    }

    // ---- UI status surface ----

    pub async fn start(&self, id: &str) -> Result<(), LifecycleError> {
        self.supervisor.start(id, false).await
    }

    /// 用户完成授权后重试 / Retry once the user completed authorization
    pub async fn retry_after_auth(&self, id: &str) -> Result<(), LifecycleError> {
        self.supervisor.start(id, true).await
    }

    pub async fn stop(&self, id: &str) {
        self.supervisor.stop(id).await
    }

    pub fn status(&self, id: &str) -> LifecycleState {
        self.supervisor.status(id)
    }

    pub async fn statuses(&self) -> Vec<BackendStatus> {
        self.supervisor.statuses().await
    }

    /// 描述符缺失的运行时 / Runtimes a backend needs that are missing on this host
    pub async fn missing_runtimes_for(&self, id: &str) -> HubResult<Vec<String>> {
        let descriptor = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| HubError::UnknownBackend(id.to_string()))?;
        Ok(self.runtime.missing_runtimes_for(&descriptor))
    }

    /// 尚未填写的输入 / Inputs the user still has to fill in
    pub async fn missing_inputs_for(&self, id: &str) -> HubResult<Vec<String>> {
        self.registry
            .get(id)
            .await
            .map(|descriptor| descriptor.missing_inputs())
            .ok_or_else(|| HubError::UnknownBackend(id.to_string()))
    }

    // ---- registry ----

    /// 安装并检测其声明的运行时 / Install and check the runtimes it declares
    pub async fn install(&self, descriptor: BackendDescriptor) -> HubResult<BackendDescriptor> {
        let installed = self.registry.install(descriptor).await?;
        if !installed.runtimes.is_empty() {
            self.runtime.check_runtimes(&installed.runtimes).await;
        }
        Ok(installed)
    }

    pub async fn import(&self, raw: &Value) -> HubResult<Vec<String>> {
        let ids = self.registry.import(raw, Origin::Imported).await?;
        let mut declared = Vec::new();
        for id in &ids {
            if let Some(descriptor) = self.registry.get(id).await {
                declared.extend(descriptor.runtimes);
            }
        }
        if !declared.is_empty() {
            self.runtime.check_runtimes(&declared).await;
        }
        Ok(ids)
    }

    /// 卸载：停止、移除并从配置档中清除 / Uninstall: stop, remove and prune from profiles
    pub async fn uninstall(&self, id: &str) -> HubResult<BackendDescriptor> {
        let removed = self
            .registry
            .remove(id)
            .await?
            .ok_or_else(|| HubError::UnknownBackend(id.to_string()))?;
        // 先移出注册表，之后的 start 不会再建立连接
        self.supervisor.forget(id).await;
        self.router.prune_backend(id).await?;
        info!("Uninstalled backend {}", id);
        Ok(removed)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> HubResult<BackendDescriptor> {
        self.registry.set_enabled(id, enabled).await
    }

    // ---- profiles ----

    pub async fn upsert_profile(&self, profile: Profile) -> HubResult<()> {
        self.router.upsert_profile(profile).await
    }

    pub fn url_for(&self, profile_id: Option<&str>) -> String {
        url_for(profile_id, self.config.port)
    }

    pub fn client_config_snippet(&self, alias: &str, profile_id: Option<&str>) -> Value {
        client_config_snippet(alias, profile_id, self.config.port)
    }

    /// 为一次请求构建合并视图 / Build the merged view for one request
    pub async fn view(&self, segment: Option<&str>) -> HubResult<MergedCatalogue> {
        let ids = self.router.resolve(segment).await?;
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(catalogue) = self.pool.list_capabilities(&id).await {
                views.push((id, catalogue));
            }
        }
        Ok(MergedCatalogue::merge(&views, self.config.collision_policy))
    }

    /// 停止所有后端 / Stop every backend
    pub async fn shutdown(&self) {
        info!("Stopping all backends");
        self.supervisor.stop_all().await;
        self.pool.disconnect_all().await;
    }
}
