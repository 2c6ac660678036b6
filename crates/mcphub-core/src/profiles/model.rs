/*!
* 文件名: model.rs
* 作者: JQQ
* 创建日期: 2025/12/20
* 最后修改日期: 2026/01/14
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde
* 描述: 配置档模型 / Profile model
*/

use crate::errors::{HubError, HubResult};
use crate::registry::validate_backend_id;
use mcphub_proto::MCP_PATH_SEGMENT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 不能用作配置档ID的路径段 / Path segments a profile id may not take
pub const RESERVED_PROFILE_IDS: &[&str] = &[MCP_PATH_SEGMENT, "health"];

/// 配置档：后端的命名子集 / Profile: a named subset of backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// 有序的后端ID集合 / Ordered set of backend ids
    #[serde(default)]
    pub backends: Vec<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            icon: None,
            backends: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        let backend_id = backend_id.into();
        if !self.backends.contains(&backend_id) {
            self.backends.push(backend_id);
        }
        self
    }

    pub fn contains(&self, backend_id: &str) -> bool {
        self.backends.iter().any(|b| b == backend_id)
    }

    /// 校验 / Validate
    pub fn validate(&self) -> HubResult<()> {
        validate_backend_id(&self.id)
            .map_err(|_| HubError::InvalidProfile(format!("'{}' is not a valid profile id", self.id)))?;
        if RESERVED_PROFILE_IDS.contains(&self.id.as_str()) {
            return Err(HubError::InvalidProfile(format!(
                "'{}' is reserved and cannot name a profile",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.as_str()) {
                return Err(HubError::InvalidProfile(format!(
                    "profile '{}' lists backend '{}' twice",
                    self.id, backend
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids_rejected() {
        assert!(Profile::new("mcp").validate().is_err());
        assert!(Profile::new("health").validate().is_err());
        assert!(Profile::new("work").validate().is_ok());
    }

    #[test]
    fn test_invalid_ids_and_duplicates() {
        assert!(matches!(
            Profile::new("a/b").validate(),
            Err(HubError::InvalidProfile(_))
        ));
        let mut profile = Profile::new("p");
        profile.backends = vec!["x".into(), "x".into()];
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_with_backend_keeps_set_semantics() {
        let profile = Profile::new("p").with_backend("a").with_backend("b").with_backend("a");
        assert_eq!(profile.backends, vec!["a", "b"]);
        assert!(profile.contains("b"));
    }
}
