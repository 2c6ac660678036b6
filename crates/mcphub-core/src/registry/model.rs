/*!
* 文件名: model.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/12
* 版权: 2023 JQQ. All rights reserved.
* 依赖: serde, chrono, url, shell-words
* 描述: 后端描述符数据模型 / Backend descriptor data model
*/

use crate::errors::{HubError, HubResult};
use crate::inputs::referenced_inputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// 描述符来源 / Where a descriptor came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Manual,
    Imported,
    Catalog,
}

/// 传输方式 / How the hub reaches a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportSpec {
    /// 本地子进程，stdio通信 / Local child process spoken to over stdio
    Process {
        command: String,
        /// shell风格的参数行 / Shell-style argument line
        #[serde(default)]
        arguments_line: String,
        #[serde(default)]
        environment: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    /// 远程 streamable HTTP 端点 / Remote streamable HTTP endpoint
    Remote {
        endpoint_url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl TransportSpec {
    pub fn is_remote(&self) -> bool {
        matches!(self, TransportSpec::Remote { .. })
    }

    /// 拆分参数行 / Split the argument line into arguments
    pub fn split_arguments(arguments_line: &str) -> HubResult<Vec<String>> {
        shell_words::split(arguments_line).map_err(|e| {
            HubError::InvalidDescriptor(format!("cannot parse arguments '{}': {}", arguments_line, e))
        })
    }
}

/// 用户输入字段，以 `${input:<id>}` 引用
/// User-supplied input referenced as `${input:<id>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// 是否为密钥 / Whether the value is a secret
    #[serde(default)]
    pub password: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl InputField {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            password: false,
            default: None,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.password = true;
        self
    }

    /// 生效值：用户值优先，其次默认值 / Effective value: user value first, then default
    pub fn effective_value(&self) -> Option<&str> {
        self.value.as_deref().or(self.default.as_deref())
    }
}

fn default_enabled() -> bool {
    true
}

/// 后端描述符 / Backend descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// 唯一ID，同时用作路由标识 / Unique identifier, also used in routes
    pub id: String,
    /// 显示名称 / Display name
    pub name: String,
    #[serde(default)]
    pub origin: Origin,
    pub transport: TransportSpec,
    #[serde(default)]
    pub inputs: Vec<InputField>,
    /// 依赖的运行时 / Runtimes the backend needs
    #[serde(default)]
    pub runtimes: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 不对外暴露的工具 / Tools never exposed through the hub
    #[serde(default)]
    pub forbidden_tools: Vec<String>,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackendDescriptor {
    /// 创建进程后端 / Create a process backend
    pub fn process(id: impl Into<String>, command: impl Into<String>, arguments_line: impl Into<String>) -> Self {
        Self::with_transport(
            id,
            TransportSpec::Process {
                command: command.into(),
                arguments_line: arguments_line.into(),
                environment: BTreeMap::new(),
                cwd: None,
            },
        )
    }

    /// 创建远程后端 / Create a remote backend
    pub fn remote(id: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        Self::with_transport(
            id,
            TransportSpec::Remote {
                endpoint_url: endpoint_url.into(),
                headers: BTreeMap::new(),
            },
        )
    }

    fn with_transport(id: impl Into<String>, transport: TransportSpec) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            name: id.clone(),
            id,
            origin: Origin::Manual,
            transport,
            inputs: Vec::new(),
            runtimes: Vec::new(),
            enabled: true,
            forbidden_tools: Vec::new(),
            installed_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// 添加环境变量或请求头 / Add an environment variable (process) or header (remote)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.transport {
            TransportSpec::Process { environment, .. } => {
                environment.insert(key.into(), value.into());
            }
            TransportSpec::Remote { headers, .. } => {
                headers.insert(key.into(), value.into());
            }
        }
        self
    }

    pub fn with_input(mut self, input: InputField) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtimes.push(runtime.into());
        self
    }

    pub fn with_forbidden_tool(mut self, tool: impl Into<String>) -> Self {
        self.forbidden_tools.push(tool.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 刷新修改时间 / Refresh the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 远程端点（若有） / Remote endpoint, when the transport is remote
    pub fn endpoint_url(&self) -> Option<&str> {
        match &self.transport {
            TransportSpec::Remote { endpoint_url, .. } => Some(endpoint_url),
            TransportSpec::Process { .. } => None,
        }
    }

    /// 被引用但没有值的输入 / Inputs referenced by the transport that have no value yet
    pub fn missing_inputs(&self) -> Vec<String> {
        let templated: Vec<&str> = match &self.transport {
            TransportSpec::Process {
                command,
                arguments_line,
                environment,
                cwd,
            } => [command.as_str(), arguments_line.as_str()]
                .into_iter()
                .chain(environment.values().map(String::as_str))
                .chain(cwd.as_deref())
                .collect(),
            TransportSpec::Remote { endpoint_url, headers } => std::iter::once(endpoint_url.as_str())
                .chain(headers.values().map(String::as_str))
                .collect(),
        };

        let mut missing: Vec<String> = Vec::new();
        for id in templated.into_iter().flat_map(referenced_inputs) {
            let resolved = self
                .inputs
                .iter()
                .any(|input| input.id == id && input.effective_value().is_some());
            if !resolved && !missing.contains(&id) {
                missing.push(id);
            }
        }
        missing
    }

    /// 校验描述符 / Validate the descriptor
    ///
    /// 任何修改注册表的操作都先调用它。
    /// Every registry mutation runs this first.
    pub fn validate(&self) -> HubResult<()> {
        validate_backend_id(&self.id)?;

        match &self.transport {
            TransportSpec::Process {
                command,
                arguments_line,
                ..
            } => {
                if command.trim().is_empty() {
                    return Err(invalid(&self.id, "process transport needs a command"));
                }
                TransportSpec::split_arguments(arguments_line)?;
            }
            TransportSpec::Remote { endpoint_url, .. } => {
                // 占位符可能出现在URL中，先代入一个合法值再校验
                let probe = endpoint_url.replace("${input:", "x").replace('}', "");
                let parsed = url::Url::parse(&probe)
                    .map_err(|e| invalid(&self.id, &format!("endpoint '{}' is not a URL: {}", endpoint_url, e)))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(invalid(
                        &self.id,
                        &format!("endpoint scheme must be http or https, got '{}'", parsed.scheme()),
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.id.trim().is_empty() {
                return Err(invalid(&self.id, "input id must not be empty"));
            }
            if !seen.insert(input.id.as_str()) {
                return Err(invalid(&self.id, &format!("duplicate input id '{}'", input.id)));
            }
        }

        if self.runtimes.iter().any(|r| r.trim().is_empty()) {
            return Err(invalid(&self.id, "runtime names must not be empty"));
        }
        Ok(())
    }
}

fn invalid(id: &str, reason: &str) -> HubError {
    HubError::InvalidDescriptor(format!("{}: {}", id, reason))
}

/// 校验后端ID / Validate a backend identifier
pub fn validate_backend_id(id: &str) -> HubResult<()> {
    if id.is_empty() {
        return Err(HubError::InvalidDescriptor("identifier must not be empty".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(HubError::InvalidDescriptor(format!(
            "identifier '{}' may only contain letters, digits, '.', '_' and '-'",
            id
        )));
    }
    Ok(())
}

/// 将任意名称转为合法ID / Turn an arbitrary name into a valid identifier
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

/// 常见客户端配置文件中的条目（`mcpServers` 格式）
/// Entry of the `mcpServers` map found in common client configuration files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBackendEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, alias = "serverUrl", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// 从命令名推断所需的运行时 / Runtime implied by a launcher command
fn runtime_for_command(command: &str) -> Option<&'static str> {
    let binary = command.rsplit(['/', '\\']).next().unwrap_or(command);
    let binary = binary.strip_suffix(".exe").unwrap_or(binary);
    match binary {
        "node" | "npx" | "npm" => Some("node"),
        "python" | "python3" => Some("python"),
        "uv" | "uvx" => Some("uv"),
        "docker" => Some("docker"),
        _ => None,
    }
}

impl RawBackendEntry {
    /// 转换为描述符 / Convert into a descriptor
    ///
    /// 常见启动器（npx、uvx、docker…）对应的运行时会被记为依赖。
    /// Well-known launchers (npx, uvx, docker, ...) are recorded as runtime requirements.
    pub fn into_descriptor(self, name: &str, origin: Origin) -> HubResult<BackendDescriptor> {
        let id = slugify(name);
        let runtime = self.command.as_deref().and_then(runtime_for_command);
        let transport = match (self.command, self.url) {
            (Some(command), None) => TransportSpec::Process {
                command,
                arguments_line: shell_words::join(&self.args),
                environment: self.env,
                cwd: self.cwd,
            },
            (None, Some(endpoint_url)) => TransportSpec::Remote {
                endpoint_url,
                headers: self.headers,
            },
            (Some(_), Some(_)) => {
                return Err(invalid(name, "entry has both a command and a url"));
            }
            (None, None) => {
                return Err(invalid(name, "entry has neither a command nor a url"));
            }
        };

        let mut descriptor = BackendDescriptor::with_transport(id, transport)
            .with_name(name.trim())
            .with_origin(origin);
        descriptor.enabled = !self.disabled.unwrap_or(false);
        descriptor.runtimes.extend(runtime.map(str::to_string));
        descriptor.validate()?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_descriptor_validates() {
        let d = BackendDescriptor::process("fs", "npx", "-y @modelcontextprotocol/server-filesystem /tmp");
        assert!(d.validate().is_ok());
        assert_eq!(d.name, "fs");
        assert!(d.enabled);
    }

    #[test]
    fn test_import_infers_runtime_from_launcher() {
        let entry: RawBackendEntry = serde_json::from_value(json!({"command": "npx", "args": ["-y", "pkg"]})).unwrap();
        let d = entry.into_descriptor("Files", Origin::Imported).unwrap();
        assert_eq!(d.runtimes, vec!["node"]);

        let entry: RawBackendEntry = serde_json::from_value(json!({"command": "/usr/local/bin/uvx"})).unwrap();
        assert_eq!(entry.into_descriptor("git", Origin::Imported).unwrap().runtimes, vec!["uv"]);

        let entry: RawBackendEntry = serde_json::from_value(json!({"command": "./my-server"})).unwrap();
        assert!(entry.into_descriptor("own", Origin::Imported).unwrap().runtimes.is_empty());
    }

    #[test]
    fn test_missing_inputs() {
        let d = BackendDescriptor::process("gh", "npx", "server --org ${input:org}")
            .with_env("TOKEN", "${input:token}")
            .with_env("ALSO", "${input:token}")
            .with_input(InputField::new("org").with_default("acme"))
            .with_input(InputField::new("token").secret());
        assert_eq!(d.missing_inputs(), vec!["token"]);

        let r = BackendDescriptor::remote("r", "https://example.com/mcp");
        assert!(r.missing_inputs().is_empty());
    }

    #[test]
    fn test_rejects_bad_identifier() {
        let d = BackendDescriptor::process("has space", "node", "");
        assert!(matches!(d.validate(), Err(HubError::InvalidDescriptor(_))));
        let d = BackendDescriptor::process("", "node", "");
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_command_and_bad_quotes() {
        assert!(BackendDescriptor::process("a", "  ", "").validate().is_err());
        assert!(BackendDescriptor::process("a", "node", "\"unterminated").validate().is_err());
    }

    #[test]
    fn test_remote_url_rules() {
        assert!(BackendDescriptor::remote("r", "https://example.com/mcp").validate().is_ok());
        assert!(BackendDescriptor::remote("r", "ftp://example.com/mcp").validate().is_err());
        assert!(BackendDescriptor::remote("r", "not a url").validate().is_err());
        assert!(BackendDescriptor::remote("r", "https://${input:host}/mcp").validate().is_ok());
    }

    #[test]
    fn test_duplicate_input_ids_rejected() {
        let d = BackendDescriptor::process("a", "node", "")
            .with_input(InputField::new("token"))
            .with_input(InputField::new("token"));
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_effective_value_prefers_user_value() {
        let input = InputField::new("k").with_default("d");
        assert_eq!(input.effective_value(), Some("d"));
        assert_eq!(input.with_value("v").effective_value(), Some("v"));
        assert_eq!(InputField::new("k").effective_value(), None);
    }

    #[test]
    fn test_transport_serializes_with_type_tag() {
        let d = BackendDescriptor::remote("r", "https://example.com/mcp");
        let v = serde_json::to_value(&d.transport).unwrap();
        assert_eq!(v["type"], json!("remote"));
        assert_eq!(v["endpoint_url"], json!("https://example.com/mcp"));
    }

    #[test]
    fn test_raw_entry_conversion() {
        let raw: RawBackendEntry = serde_json::from_value(json!({
            "command": "uvx",
            "args": ["mcp-server-git", "--repository", "/path with space"],
            "env": {"GIT_TOKEN": "${input:token}"}
        }))
        .unwrap();
        let d = raw.into_descriptor("My Git", Origin::Imported).unwrap();
        assert_eq!(d.id, "My-Git");
        assert_eq!(d.name, "My Git");
        assert_eq!(d.origin, Origin::Imported);
        match &d.transport {
            TransportSpec::Process { arguments_line, .. } => {
                assert_eq!(
                    TransportSpec::split_arguments(arguments_line).unwrap(),
                    vec!["mcp-server-git", "--repository", "/path with space"]
                );
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn test_raw_entry_needs_exactly_one_transport() {
        assert!(RawBackendEntry::default().into_descriptor("x", Origin::Imported).is_err());
        let both = RawBackendEntry {
            command: Some("node".into()),
            url: Some("https://example.com".into()),
            ..Default::default()
        };
        assert!(both.into_descriptor("x", Origin::Imported).is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify(" GitHub (remote) "), "GitHub--remote");
        assert_eq!(slugify("ok.name_1"), "ok.name_1");
    }
}
