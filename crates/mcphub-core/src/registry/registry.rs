/*!
* 文件名: registry.rs
* 作者: JQQ
* 创建日期: 2025/12/16
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, tracing
* 描述: 后端注册表 / Backend registry
*/

use super::model::{BackendDescriptor, Origin, RawBackendEntry};
use crate::config::{load_typed, save_typed, ConfigStore, BACKENDS_KEY};
use crate::errors::{HubError, HubResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 后端注册表 / Backend registry
///
/// 保存描述符的有序列表，并在每次修改后写回配置存储。
/// Holds the ordered descriptor list and writes it back to the config store after every change.
pub struct BackendRegistry {
    store: Arc<dyn ConfigStore>,
    descriptors: RwLock<Vec<BackendDescriptor>>,
}

impl BackendRegistry {
    /// 创建空注册表 / Create an empty registry
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            descriptors: RwLock::new(Vec::new()),
        }
    }

    /// 从配置存储加载 / Load from the config store
    ///
    /// 无效或重复的条目被跳过并记录警告。
    /// Invalid or duplicate entries are skipped with a warning.
    pub async fn load(store: Arc<dyn ConfigStore>) -> HubResult<Self> {
        let stored: Vec<BackendDescriptor> =
            load_typed(store.as_ref(), BACKENDS_KEY).await?.unwrap_or_default();

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(stored.len());
        for descriptor in stored {
            if let Err(e) = descriptor.validate() {
                warn!("Skipping stored backend: {}", e);
                continue;
            }
            if !seen.insert(descriptor.id.clone()) {
                warn!("Skipping duplicate stored backend: {}", descriptor.id);
                continue;
            }
            descriptors.push(descriptor);
        }
        info!("Loaded {} backend descriptors", descriptors.len());

        Ok(Self {
            store,
            descriptors: RwLock::new(descriptors),
        })
    }

    /// 按注册顺序列出 / List in registration order
    pub async fn list(&self) -> Vec<BackendDescriptor> {
        self.descriptors.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<BackendDescriptor> {
        self.descriptors.read().await.iter().find(|d| d.id == id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.descriptors.read().await.iter().any(|d| d.id == id)
    }

    /// 已启用后端的ID（注册顺序） / Identifiers of enabled backends, in registration order
    pub async fn enabled_ids(&self) -> Vec<String> {
        self.descriptors
            .read()
            .await
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.id.clone())
            .collect()
    }

    /// 插入或替换 / Insert or replace
    ///
    /// 替换时保留原有位置；描述符按原样保存。
    /// A replacement keeps its position; the descriptor is stored as given.
    pub async fn upsert(&self, descriptor: BackendDescriptor) -> HubResult<()> {
        descriptor.validate()?;
        let mut descriptors = self.descriptors.write().await;
        match descriptors.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => descriptors.push(descriptor),
        }
        self.persist(&descriptors).await
    }

    /// 安装新后端，ID已存在时报错 / Install a new backend, failing when the id is taken
    pub async fn install(&self, mut descriptor: BackendDescriptor) -> HubResult<BackendDescriptor> {
        descriptor.validate()?;
        let mut descriptors = self.descriptors.write().await;
        if descriptors.iter().any(|d| d.id == descriptor.id) {
            return Err(HubError::InvalidDescriptor(format!(
                "backend '{}' is already installed",
                descriptor.id
            )));
        }
        let now = chrono::Utc::now();
        descriptor.installed_at = now;
        descriptor.updated_at = now;
        descriptors.push(descriptor.clone());
        self.persist(&descriptors).await?;
        info!("Installed backend {}", descriptor.id);
        Ok(descriptor)
    }

    /// 移除 / Remove
    pub async fn remove(&self, id: &str) -> HubResult<Option<BackendDescriptor>> {
        let mut descriptors = self.descriptors.write().await;
        let Some(index) = descriptors.iter().position(|d| d.id == id) else {
            return Ok(None);
        };
        let removed = descriptors.remove(index);
        self.persist(&descriptors).await?;
        info!("Removed backend {}", id);
        Ok(Some(removed))
    }

    /// 启用或禁用 / Enable or disable
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> HubResult<BackendDescriptor> {
        let mut descriptors = self.descriptors.write().await;
        let descriptor = descriptors
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| HubError::UnknownBackend(id.to_string()))?;
        descriptor.enabled = enabled;
        descriptor.touch();
        let updated = descriptor.clone();
        self.persist(&descriptors).await?;
        Ok(updated)
    }

    /// 导入 `mcpServers` 配置 / Import an `mcpServers` configuration
    ///
    /// 接受 `{"mcpServers": {...}}` 或直接的名称映射。所有条目先全部校验，
    /// 任一条目无效时整个导入失败且注册表不变。已存在的ID会被替换。
    /// Accepts `{"mcpServers": {...}}` or the bare name map. Every entry is validated first;
    /// one invalid entry fails the whole import and leaves the registry untouched.
    /// Existing identifiers are replaced.
    pub async fn import(&self, raw: &Value, origin: Origin) -> HubResult<Vec<String>> {
        let servers = raw.get("mcpServers").unwrap_or(raw);
        let entries: BTreeMap<String, RawBackendEntry> = serde_json::from_value(servers.clone())
            .map_err(|e| HubError::InvalidDescriptor(format!("unreadable import: {}", e)))?;

        let mut imported = Vec::with_capacity(entries.len());
        let mut ids = HashSet::new();
        for (name, entry) in entries {
            let descriptor = entry.into_descriptor(&name, origin)?;
            if !ids.insert(descriptor.id.clone()) {
                return Err(HubError::InvalidDescriptor(format!(
                    "import maps two entries onto identifier '{}'",
                    descriptor.id
                )));
            }
            imported.push(descriptor);
        }

        let mut descriptors = self.descriptors.write().await;
        let mut ids = Vec::with_capacity(imported.len());
        for descriptor in imported {
            ids.push(descriptor.id.clone());
            match descriptors.iter_mut().find(|d| d.id == descriptor.id) {
                Some(existing) => {
                    let installed_at = existing.installed_at;
                    *existing = descriptor;
                    existing.installed_at = installed_at;
                }
                None => descriptors.push(descriptor),
            }
        }
        self.persist(&descriptors).await?;
        info!("Imported {} backends", ids.len());
        Ok(ids)
    }

    async fn persist(&self, descriptors: &[BackendDescriptor]) -> HubResult<()> {
        save_typed(self.store.as_ref(), BACKENDS_KEY, &descriptors).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use serde_json::json;

    fn registry() -> (Arc<MemoryConfigStore>, BackendRegistry) {
        let store = Arc::new(MemoryConfigStore::new());
        let registry = BackendRegistry::new(store.clone());
        (store, registry)
    }

    #[tokio::test]
    async fn test_upsert_then_get_roundtrip() {
        let (_, registry) = registry();
        let d = BackendDescriptor::process("fs", "node", "server.js").with_env("ROOT", "/tmp");
        registry.upsert(d.clone()).await.unwrap();
        assert_eq!(registry.get("fs").await, Some(d));
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let (_, registry) = registry();
        registry.upsert(BackendDescriptor::process("a", "node", "")).await.unwrap();
        registry.upsert(BackendDescriptor::process("b", "node", "")).await.unwrap();
        registry
            .upsert(BackendDescriptor::process("a", "python", "-m srv"))
            .await
            .unwrap();

        let ids: Vec<_> = registry.list().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_leaves_registry_unchanged() {
        let (store, registry) = registry();
        registry.upsert(BackendDescriptor::process("a", "node", "")).await.unwrap();
        let before = store.snapshot().await;

        let err = registry.upsert(BackendDescriptor::process("b", "", "")).await;
        assert!(matches!(err, Err(HubError::InvalidDescriptor(_))));
        assert_eq!(registry.list().await.len(), 1);
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_install_rejects_duplicate() {
        let (_, registry) = registry();
        registry.install(BackendDescriptor::process("a", "node", "")).await.unwrap();
        let err = registry.install(BackendDescriptor::process("a", "node", "")).await;
        assert!(matches!(err, Err(HubError::InvalidDescriptor(_))));
    }

    #[tokio::test]
    async fn test_persisted_and_reloaded() {
        let (store, registry) = registry();
        registry.upsert(BackendDescriptor::process("a", "node", "")).await.unwrap();
        registry
            .upsert(BackendDescriptor::remote("b", "https://example.com/mcp").disabled())
            .await
            .unwrap();

        let reloaded = BackendRegistry::load(store).await.unwrap();
        assert_eq!(reloaded.list().await, registry.list().await);
        assert_eq!(reloaded.enabled_ids().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_load_skips_invalid_entries() {
        let good = serde_json::to_value(BackendDescriptor::process("ok", "node", "")).unwrap();
        let bad = serde_json::to_value(BackendDescriptor::process("bad id", "node", "")).unwrap();
        let store = Arc::new(MemoryConfigStore::new().with_value(BACKENDS_KEY, json!([good, bad])));
        let registry = BackendRegistry::load(store).await.unwrap();
        assert_eq!(registry.enabled_ids().await, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_remove_and_set_enabled() {
        let (_, registry) = registry();
        registry.upsert(BackendDescriptor::process("a", "node", "")).await.unwrap();
        let updated = registry.set_enabled("a", false).await.unwrap();
        assert!(!updated.enabled);
        assert!(matches!(
            registry.set_enabled("missing", true).await,
            Err(HubError::UnknownBackend(_))
        ));
        assert!(registry.remove("a").await.unwrap().is_some());
        assert!(registry.remove("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_all_or_nothing() {
        let (_, registry) = registry();
        let config = json!({"mcpServers": {
            "git": {"command": "uvx", "args": ["mcp-server-git"]},
            "broken": {"args": ["no command"]}
        }});
        assert!(registry.import(&config, Origin::Imported).await.is_err());
        assert!(registry.list().await.is_empty());

        let config = json!({
            "git": {"command": "uvx", "args": ["mcp-server-git"]},
            "linear": {"url": "https://mcp.linear.app/mcp"}
        });
        let ids = registry.import(&config, Origin::Imported).await.unwrap();
        assert_eq!(ids, vec!["git", "linear"]);
        assert!(registry.get("linear").await.unwrap().transport.is_remote());
    }
}
