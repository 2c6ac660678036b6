/*!
* 文件名: merge.rs
* 作者: JQQ
* 创建日期: 2025/12/20
* 最后修改日期: 2026/01/15
* 版权: 2023 JQQ. All rights reserved.
* 依赖: tracing
* 描述: 合并多个后端的能力目录 / Merge the capability catalogues of several backends
*/

use crate::config::CollisionPolicy;
use mcphub_proto::{CapabilityCatalogue, Prompt, Resource, Tool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 前缀分隔符 / Separator between backend id and tool name
pub const PREFIX_SEPARATOR: &str = "__";

/// 对外名称到后端原始名称的路由 / Route from an exposed name to a backend's own name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub backend_id: String,
    pub name: String,
}

/// 一个配置档在单次请求中的合并视图 / Merged view of a profile for one request
#[derive(Debug, Default)]
pub struct MergedCatalogue {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub prompts: Vec<Prompt>,
    tool_routes: HashMap<String, Route>,
    resource_routes: HashMap<String, String>,
    prompt_routes: HashMap<String, Route>,
    backends: Vec<String>,
}

fn exposed_name(policy: CollisionPolicy, backend_id: &str, name: &str) -> String {
    match policy {
        CollisionPolicy::FirstRegistered => name.to_string(),
        CollisionPolicy::PrefixBackend => format!("{}{}{}", backend_id, PREFIX_SEPARATOR, name),
    }
}

impl MergedCatalogue {
    /// 按顺序合并 / Merge in order
    ///
    /// 先出现的后端优先；被隐藏的重名条目记录警告。
    /// Earlier backends take precedence; hidden duplicates are logged.
    pub fn merge(views: &[(String, Arc<CapabilityCatalogue>)], policy: CollisionPolicy) -> Self {
        let mut merged = MergedCatalogue {
            backends: views.iter().map(|(id, _)| id.clone()).collect(),
            ..Default::default()
        };

        for (backend_id, catalogue) in views {
            for tool in &catalogue.tools {
                let name = exposed_name(policy, backend_id, &tool.name);
                if let Some(winner) = merged.tool_routes.get(&name) {
                    warn!(
                        "Tool '{}' exists in multiple backends: keeping {}, hiding {}",
                        name, winner.backend_id, backend_id
                    );
                    continue;
                }
                merged.tool_routes.insert(
                    name.clone(),
                    Route {
                        backend_id: backend_id.clone(),
                        name: tool.name.clone(),
                    },
                );
                let mut exposed = tool.clone();
                exposed.name = name;
                merged.tools.push(exposed);
            }

            for resource in &catalogue.resources {
                if merged.resource_routes.contains_key(&resource.uri) {
                    warn!("Resource '{}' offered by several backends, hiding the one from {}", resource.uri, backend_id);
                    continue;
                }
                merged
                    .resource_routes
                    .insert(resource.uri.clone(), backend_id.clone());
                merged.resources.push(resource.clone());
            }

            for prompt in &catalogue.prompts {
                let name = exposed_name(policy, backend_id, &prompt.name);
                if merged.prompt_routes.contains_key(&name) {
                    warn!("Prompt '{}' exists in multiple backends, hiding the one from {}", name, backend_id);
                    continue;
                }
                merged.prompt_routes.insert(
                    name.clone(),
                    Route {
                        backend_id: backend_id.clone(),
                        name: prompt.name.clone(),
                    },
                );
                let mut exposed = prompt.clone();
                exposed.name = name;
                merged.prompts.push(exposed);
            }
        }
        merged
    }

    pub fn route_tool(&self, name: &str) -> Option<&Route> {
        self.tool_routes.get(name)
    }

    pub fn route_resource(&self, uri: &str) -> Option<&str> {
        self.resource_routes.get(uri).map(String::as_str)
    }

    pub fn route_prompt(&self, name: &str) -> Option<&Route> {
        self.prompt_routes.get(name)
    }

    /// 参与合并的后端（按顺序） / Backends that took part, in order
    pub fn backends(&self) -> &[String] {
        &self.backends
    }
}

/// 合并能力目录 / Merge capability catalogues
pub fn merge_catalogues(views: &[(String, Arc<CapabilityCatalogue>)], policy: CollisionPolicy) -> MergedCatalogue {
    MergedCatalogue::merge(views, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue(tools: &[&str]) -> Arc<CapabilityCatalogue> {
        Arc::new(CapabilityCatalogue {
            tools: tools.iter().map(|t| Tool::new(*t)).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_first_registered_wins() {
        let views = vec![
            ("a".to_string(), catalogue(&["search", "read"])),
            ("b".to_string(), catalogue(&["search", "write"])),
        ];
        let merged = merge_catalogues(&views, CollisionPolicy::FirstRegistered);

        let names: Vec<_> = merged.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search", "read", "write"]);
        assert_eq!(merged.route_tool("search").unwrap().backend_id, "a");
        assert_eq!(merged.route_tool("write").unwrap().backend_id, "b");
        assert!(merged.route_tool("missing").is_none());
    }

    #[test]
    fn test_prefix_backend_exposes_everything() {
        let views = vec![
            ("a".to_string(), catalogue(&["search"])),
            ("b".to_string(), catalogue(&["search"])),
        ];
        let merged = merge_catalogues(&views, CollisionPolicy::PrefixBackend);

        let names: Vec<_> = merged.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a__search", "b__search"]);
        assert_eq!(
            merged.route_tool("b__search"),
            Some(&Route {
                backend_id: "b".into(),
                name: "search".into()
            })
        );
    }

    #[test]
    fn test_resources_and_prompts_routed() {
        let a = Arc::new(CapabilityCatalogue {
            resources: vec![Resource::new("file:///a.txt", "a")],
            prompts: vec![Prompt::new("summarize")],
            ..Default::default()
        });
        let b = Arc::new(CapabilityCatalogue {
            resources: vec![Resource::new("file:///a.txt", "dup"), Resource::new("file:///b.txt", "b")],
            ..Default::default()
        });
        let merged = merge_catalogues(
            &[("a".to_string(), a), ("b".to_string(), b)],
            CollisionPolicy::FirstRegistered,
        );
        assert_eq!(merged.resources.len(), 2);
        assert_eq!(merged.route_resource("file:///a.txt"), Some("a"));
        assert_eq!(merged.route_resource("file:///b.txt"), Some("b"));
        assert_eq!(merged.route_prompt("summarize").unwrap().backend_id, "a");
        assert_eq!(merged.backends(), ["a".to_string(), "b".to_string()]);
    }
}
