/*!
* 文件名: router.rs
* 作者: JQQ
* 创建日期: 2025/12/20
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, tracing
* 描述: 配置档路由 / Profile router
*/

use super::model::Profile;
use crate::config::{load_typed, save_typed, ConfigStore, PROFILES_KEY};
use crate::errors::{HubError, HubResult};
use crate::registry::BackendRegistry;
use crate::supervisor::Supervisor;
use mcphub_proto::MCP_PATH_SEGMENT;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 配置档的URL / URL of a profile endpoint
///
/// ```
/// use mcphub_core::profiles::url_for;
/// assert_eq!(url_for(None, 7195), "http://localhost:7195/mcp");
/// assert_eq!(url_for(Some("work"), 7195), "http://localhost:7195/work/mcp");
/// ```
pub fn url_for(profile_id: Option<&str>, port: u16) -> String {
    match profile_id {
        Some(id) if !id.is_empty() => format!("http://localhost:{}/{}/{}", port, id, MCP_PATH_SEGMENT),
        _ => format!("http://localhost:{}/{}", port, MCP_PATH_SEGMENT),
    }
}

/// 客户端配置片段 / Client configuration snippet
///
/// 外部工具的配置写入器只需要 `{ "<alias>": { "url": ... } }`。
/// Config writers of external tools only need `{ "<alias>": { "url": ... } }`.
pub fn client_config_snippet(alias: &str, profile_id: Option<&str>, port: u16) -> Value {
    json!({ alias: { "url": url_for(profile_id, port) } })
}

/// 配置档路由 / Profile router
///
/// 路由表整体替换，进行中的请求看到的始终是完整快照。
/// The routing table is swapped wholesale; in-flight requests always see a complete snapshot.
pub struct ProfileRouter {
    store: Arc<dyn ConfigStore>,
    registry: Arc<BackendRegistry>,
    supervisor: Supervisor,
    table: RwLock<Arc<Vec<Profile>>>,
    /// 串行化修改与持久化 / Serialises mutations and their persistence
    write_lock: Mutex<()>,
}

impl ProfileRouter {
    pub fn new(store: Arc<dyn ConfigStore>, registry: Arc<BackendRegistry>, supervisor: Supervisor) -> Self {
        Self {
            store,
            registry,
            supervisor,
            table: RwLock::new(Arc::new(Vec::new())),
            write_lock: Mutex::new(()),
        }
    }

    /// 从配置存储加载 / Load from the config store
    pub async fn load(
        store: Arc<dyn ConfigStore>,
        registry: Arc<BackendRegistry>,
        supervisor: Supervisor,
    ) -> HubResult<Self> {
        let stored: Vec<Profile> = load_typed(store.as_ref(), PROFILES_KEY).await?.unwrap_or_default();
        let mut seen = HashSet::new();
        let profiles: Vec<Profile> = stored
            .into_iter()
            .filter(|profile| match profile.validate() {
                Ok(()) => seen.insert(profile.id.clone()),
                Err(e) => {
                    warn!("Skipping stored profile: {}", e);
                    false
                }
            })
            .collect();
        info!("Loaded {} profiles", profiles.len());

        let router = Self::new(store, registry, supervisor);
        router.replace_table(profiles);
        Ok(router)
    }

    fn snapshot(&self) -> Arc<Vec<Profile>> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace_table(&self, profiles: Vec<Profile>) {
        *self.table.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(profiles);
    }

    pub fn list_profiles(&self) -> Vec<Profile> {
        self.snapshot().as_ref().clone()
    }

    pub fn get_profile(&self, id: &str) -> Option<Profile> {
        self.snapshot().iter().find(|p| p.id == id).cloned()
    }

    /// 插入或替换配置档 / Insert or replace a profile
    pub async fn upsert_profile(&self, profile: Profile) -> HubResult<()> {
        profile.validate()?;
        for backend in &profile.backends {
            if !self.registry.contains(backend).await {
                warn!("Profile {} references unknown backend {}", profile.id, backend);
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut profiles = self.list_profiles();
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        save_typed(self.store.as_ref(), PROFILES_KEY, &profiles).await?;
        self.replace_table(profiles);
        Ok(())
    }

    /// 删除配置档，不影响其中的后端 / Remove a profile; its backends are untouched
    pub async fn remove_profile(&self, id: &str) -> HubResult<Option<Profile>> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.list_profiles();
        let Some(index) = profiles.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        let removed = profiles.remove(index);
        save_typed(self.store.as_ref(), PROFILES_KEY, &profiles).await?;
        self.replace_table(profiles);
        info!("Removed profile {}", id);
        Ok(Some(removed))
    }

    /// 从所有配置档中移除后端 / Remove a backend from every profile
    pub async fn prune_backend(&self, backend_id: &str) -> HubResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.list_profiles();
        let mut changed = false;
        for profile in profiles.iter_mut() {
            let before = profile.backends.len();
            profile.backends.retain(|b| b != backend_id);
            changed |= profile.backends.len() != before;
        }
        if changed {
            save_typed(self.store.as_ref(), PROFILES_KEY, &profiles).await?;
            self.replace_table(profiles);
        }
        Ok(())
    }

    /// 解析路径段为运行中的后端 / Resolve a path segment to running backends
    ///
    /// 默认路径：所有已启用且运行中的后端；命名配置档：其后端与运行中后端的交集。
    /// 两者都按注册顺序返回，工具名冲突时先注册者优先。
    /// Default path: every enabled running backend. Named profile: its backends intersected
    /// with the running ones. Both come back in registry order, the collision precedence.
    pub async fn resolve(&self, segment: Option<&str>) -> HubResult<Vec<String>> {
        match segment {
            None | Some("") => Ok(self
                .registry
                .enabled_ids()
                .await
                .into_iter()
                .filter(|id| self.supervisor.is_running(id))
                .collect()),
            Some(profile_id) => {
                let table = self.snapshot();
                let profile = table
                    .iter()
                    .find(|p| p.id == profile_id)
                    .ok_or_else(|| HubError::ProfileNotFound(profile_id.to_string()))?;
                let members: HashSet<&str> = profile.backends.iter().map(String::as_str).collect();
                Ok(self
                    .registry
                    .list()
                    .await
                    .into_iter()
                    .map(|descriptor| descriptor.id)
                    .filter(|id| members.contains(id.as_str()) && self.supervisor.is_running(id))
                    .collect())
            }
        }
    }
}
