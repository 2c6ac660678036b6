/*!
* 文件名: render.rs
* 作者: JQQ
* 创建日期: 2025/12/15
* 最后修改日期: 2026/01/10
* 版权: 2023 JQQ. All rights reserved.
* 依赖: regex, lazy_static
* 描述: 配置渲染器 / Configuration renderer
*/

use crate::errors::HubResult;
use crate::mcp_clients::model::{ServerParameters, StdioServerParameters, StreamableHttpParameters};
use crate::registry::{BackendDescriptor, InputField, TransportSpec};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

lazy_static::lazy_static! {
    /// 占位符模式正则 / Placeholder pattern regex
    static ref PLACEHOLDER_PATTERN: Regex = Regex::new(r"\$\{input:([^}]+)}").unwrap();
}

/// 配置渲染器 / Configuration renderer
///
/// 用输入字段的生效值替换 `${input:<id>}`。未解析的占位符原样保留并告警。
/// Replaces `${input:<id>}` with the effective value of the matching input.
/// Unresolved placeholders stay verbatim and are reported with a warning.
pub struct ConfigRender<'a> {
    backend_id: &'a str,
    values: HashMap<&'a str, &'a str>,
}

impl<'a> ConfigRender<'a> {
    /// 从输入字段创建 / Create from input fields
    pub fn new(backend_id: &'a str, inputs: &'a [InputField]) -> Self {
        let values = inputs
            .iter()
            .filter_map(|input| input.effective_value().map(|v| (input.id.as_str(), v)))
            .collect();
        Self { backend_id, values }
    }

    /// 渲染字符串 / Render string
    pub fn render_str(&self, s: &str) -> String {
        if !s.contains("${input:") {
            return s.to_string();
        }
        PLACEHOLDER_PATTERN
            .replace_all(s, |caps: &Captures| {
                let input_id = &caps[1];
                match self.values.get(input_id) {
                    Some(value) => value.to_string(),
                    None => {
                        warn!("Backend {} references unknown input {}", self.backend_id, input_id);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    fn render_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.render_str(v)))
            .collect()
    }

    /// 渲染传输配置 / Render a transport into connection parameters
    ///
    /// 参数行先按shell规则拆分再逐项代入，因此含空格的值仍是单个参数。
    /// The argument line is split first and then substituted per argument,
    /// so a value containing spaces stays a single argument.
    pub fn render_transport(&self, transport: &TransportSpec) -> HubResult<ServerParameters> {
        match transport {
            TransportSpec::Process {
                command,
                arguments_line,
                environment,
                cwd,
            } => {
                let args = TransportSpec::split_arguments(arguments_line)?
                    .iter()
                    .map(|arg| self.render_str(arg))
                    .collect();
                Ok(ServerParameters::Stdio(StdioServerParameters {
                    command: self.render_str(command),
                    args,
                    env: self.render_map(environment),
                    cwd: cwd.as_deref().map(|c| self.render_str(c)),
                }))
            }
            TransportSpec::Remote {
                endpoint_url,
                headers,
            } => Ok(ServerParameters::StreamableHttp(StreamableHttpParameters {
                url: self.render_str(endpoint_url),
                headers: self.render_map(headers),
            })),
        }
    }
}

/// 渲染描述符 / Render a descriptor into connection parameters
pub fn render_descriptor(descriptor: &BackendDescriptor) -> HubResult<ServerParameters> {
    ConfigRender::new(&descriptor.id, &descriptor.inputs).render_transport(&descriptor.transport)
}

/// 列出引用的输入ID / List the input ids a string references
pub fn referenced_inputs(s: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(s)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_string() {
        let inputs = vec![InputField::new("name").with_value("world")];
        let render = ConfigRender::new("t", &inputs);
        assert_eq!(render.render_str("Hello ${input:name}!"), "Hello world!");
        assert_eq!(render.render_str("${input:name}"), "world");
        assert_eq!(render.render_str("plain"), "plain");
    }

    #[test]
    fn test_unresolved_placeholder_kept_verbatim() {
        let inputs = vec![InputField::new("a").with_value("1")];
        let render = ConfigRender::new("t", &inputs);
        assert_eq!(
            render.render_str("${input:a}-${input:missing}"),
            "1-${input:missing}"
        );
    }

    #[test]
    fn test_default_used_when_no_value() {
        let inputs = vec![InputField::new("port").with_default("8080")];
        let render = ConfigRender::new("t", &inputs);
        assert_eq!(render.render_str("--port=${input:port}"), "--port=8080");
    }

    #[test]
    fn test_render_process_transport() {
        let descriptor = BackendDescriptor::process("fs", "npx", "-y server --root ${input:root}")
            .with_env("TOKEN", "${input:token}")
            .with_input(InputField::new("root").with_value("/my docs"))
            .with_input(InputField::new("token").with_value("s3cret").secret());

        match render_descriptor(&descriptor).unwrap() {
            ServerParameters::Stdio(params) => {
                assert_eq!(params.command, "npx");
                assert_eq!(params.args, vec!["-y", "server", "--root", "/my docs"]);
                assert_eq!(params.env["TOKEN"], "s3cret");
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_render_remote_transport() {
        let descriptor = BackendDescriptor::remote("r", "https://${input:host}/mcp")
            .with_env("Authorization", "Bearer ${input:key}")
            .with_input(InputField::new("host").with_value("api.example.com"))
            .with_input(InputField::new("key").with_value("abc"));

        match render_descriptor(&descriptor).unwrap() {
            ServerParameters::StreamableHttp(params) => {
                assert_eq!(params.url, "https://api.example.com/mcp");
                assert_eq!(params.headers["Authorization"], "Bearer abc");
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_referenced_inputs() {
        assert_eq!(
            referenced_inputs("${input:a} and ${input:b}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
