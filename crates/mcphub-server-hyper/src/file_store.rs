/*!
* 文件名: file_store.rs
* 作者: JQQ
* 创建日期: 2026/01/06
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tokio, serde_json, async-trait
* 描述: 基于JSON文件的配置存储 / JSON-file-backed config store
*/

use async_trait::async_trait;
use mcphub_core::config::ConfigStore;
use mcphub_core::{HubError, HubResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON文件配置存储 / JSON file config store
///
/// 整个文件是一个对象，顶层键即存储键。每次写入都先写临时文件再改名。
/// The whole file is one object whose top-level keys are the store keys. Every write goes
/// to a temporary file first and is then renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// 打开存储，文件不存在时从空对象开始 / Open the store; a missing file starts empty
    pub async fn open(path: impl Into<PathBuf>) -> HubResult<Self> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => {
                    return Err(HubError::Store(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, starting empty", path.display());
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, values: &Map<String, Value>) -> HubResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let encoded = serde_json::to_vec_pretty(values)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self, key: &str) -> HubResult<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> HubResult<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.flush(&values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_file_starts_empty_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mcphub.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.get("backends").await.unwrap().is_none());
        store.set("hub", json!({"port": 9000})).await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("hub").await.unwrap(), Some(json!({"port": 9000})));
    }

    #[tokio::test]
    async fn test_non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"[1, 2]").await.unwrap();
        assert!(matches!(JsonFileStore::open(&path).await, Err(HubError::Store(_))));
    }
}
