//! MCP tool catalog.
//!
//! Connects to configured MCP servers (child process or streamable HTTP),
//! fetches their tool lists, and exposes them under namespaced names so
//! two servers exporting the same tool never collide. The connections are
//! owned by the catalog and stay alive for its lifetime.

use crate::error::{AgentError, AgentResult};
use agentry::Tool;
use async_trait::async_trait;
use rmcp::RoleClient;
use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation, ProtocolVersion,
};
use rmcp::service::{RunningService, ServerSink, serve_client};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::child_process::TokioChildProcess;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One MCP server attached to a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransportConfig,
}

/// Supported MCP client transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum McpTransportConfig {
    Http {
        url: String,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
    },
}

/// Canonicalize a server id into a tool namespace: lowercase, `_`
/// separator, must start with a letter.
pub fn canonical_namespace(server_id: &str) -> AgentResult<String> {
    let trimmed = server_id.trim().to_ascii_lowercase();
    let Some(first) = trimmed.chars().next() else {
        return Err(AgentError::InvalidInput {
            reason: "MCP server name is empty".to_string(),
        });
    };
    if !first.is_ascii_lowercase() {
        return Err(AgentError::InvalidInput {
            reason: format!("MCP server name '{server_id}' must start with a letter"),
        });
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect())
}

/// `{server_namespace}__{tool}`.
pub fn namespaced_tool_name(namespace: &str, tool: &str) -> String {
    format!("{namespace}__{tool}")
}

/// Inverse of [`namespaced_tool_name`]; `None` for unnamespaced names.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    name.split_once("__")
}

/// The seam the registry consumes: a set of tool descriptors plus a call
/// router. Implemented by the rmcp-backed catalog and by test fakes.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    fn tools(&self) -> Vec<Tool>;
    async fn call_tool(&self, namespaced_name: &str, arguments: Value) -> AgentResult<Value>;
}

/// Minimal MCP client handler: identity only, defaults for everything
/// else.
#[derive(Clone)]
pub struct CatalogClientHandler {
    info: ClientInfo,
}

impl CatalogClientHandler {
    pub fn new() -> Self {
        Self {
            info: ClientInfo::new(
                ClientCapabilities::default(),
                Implementation::new("agentry", env!("CARGO_PKG_VERSION")),
            )
            .with_protocol_version(ProtocolVersion::default()),
        }
    }
}

impl Default for CatalogClientHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHandler for CatalogClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

struct ServerEntry {
    namespace: String,
    sink: ServerSink,
    /// namespaced name -> (raw tool name, descriptor)
    tools: HashMap<String, (String, Tool)>,
}

/// rmcp-backed [`ToolCatalog`] over the configured servers.
pub struct McpToolCatalog {
    servers: Vec<ServerEntry>,
    // Dropping a RunningService tears the connection down; keep them.
    _connections: Vec<RunningService<RoleClient, CatalogClientHandler>>,
}

impl McpToolCatalog {
    /// Empty catalog (an agent without MCP servers).
    pub fn empty() -> Self {
        Self {
            servers: Vec::new(),
            _connections: Vec::new(),
        }
    }

    /// Connect every configured server and fetch its tool list.
    pub async fn connect(configs: &[McpServerConfig]) -> AgentResult<Self> {
        let mut servers = Vec::new();
        let mut connections = Vec::new();

        for config in configs {
            let namespace = canonical_namespace(&config.name)?;
            let running = start_server(config).await?;
            let sink = running.peer().clone();

            let tool_list = sink.list_all_tools().await.map_err(|e| {
                AgentError::Provider(format!("MCP server '{}' tool listing failed: {e}", config.name))
            })?;

            let mut tools = HashMap::new();
            for tool in tool_list {
                let raw_name = tool.name.clone().into_owned();
                let namespaced = namespaced_tool_name(&namespace, &raw_name);
                if tools.contains_key(&namespaced) {
                    log::warn!("duplicate MCP tool '{namespaced}', keeping first");
                    continue;
                }
                let mut schema_map: Map<String, Value> = Map::new();
                for (key, value) in tool.input_schema.as_ref().iter() {
                    schema_map.insert(key.clone(), value.clone());
                }
                let descriptor = Tool::function(
                    namespaced.clone(),
                    tool.description
                        .clone()
                        .map(|d| d.into_owned())
                        .unwrap_or_default(),
                    Value::Object(schema_map),
                );
                tools.insert(namespaced, (raw_name, descriptor));
            }
            log::info!(
                "MCP server '{}' connected as '{}' with {} tools",
                config.name,
                namespace,
                tools.len()
            );
            servers.push(ServerEntry {
                namespace,
                sink,
                tools,
            });
            connections.push(running);
        }

        Ok(Self {
            servers,
            _connections: connections,
        })
    }
}

async fn start_server(
    config: &McpServerConfig,
) -> AgentResult<RunningService<RoleClient, CatalogClientHandler>> {
    let handler = CatalogClientHandler::new();
    match &config.transport {
        McpTransportConfig::Http { url } => {
            let transport = StreamableHttpClientTransport::from_uri(url.clone());
            serve_client(handler, transport).await.map_err(|e| {
                AgentError::Provider(format!(
                    "MCP http server '{}' failed to start: {e}",
                    config.name
                ))
            })
        }
        McpTransportConfig::Stdio {
            command,
            args,
            envs,
        } => {
            let mut cmd = tokio::process::Command::new(command);
            cmd.args(args)
                .envs(envs)
                .stderr(std::process::Stdio::inherit())
                .stdout(std::process::Stdio::piped())
                .stdin(std::process::Stdio::piped());
            let transport = TokioChildProcess::new(cmd).map_err(|e| {
                AgentError::Provider(format!(
                    "MCP stdio server '{}' failed to spawn: {e}",
                    config.name
                ))
            })?;
            serve_client(handler, transport).await.map_err(|e| {
                AgentError::Provider(format!(
                    "MCP stdio server '{}' failed to start: {e}",
                    config.name
                ))
            })
        }
    }
}

#[async_trait]
impl ToolCatalog for McpToolCatalog {
    fn tools(&self) -> Vec<Tool> {
        self.servers
            .iter()
            .flat_map(|server| server.tools.values().map(|(_, tool)| tool.clone()))
            .collect()
    }

    async fn call_tool(&self, namespaced_name: &str, arguments: Value) -> AgentResult<Value> {
        let Some((namespace, _)) = split_namespaced(namespaced_name) else {
            return Err(AgentError::ToolNotFound {
                name: namespaced_name.to_string(),
            });
        };
        let server = self
            .servers
            .iter()
            .find(|server| server.namespace == namespace)
            .ok_or_else(|| AgentError::ToolNotFound {
                name: namespaced_name.to_string(),
            })?;
        let (raw_name, _) =
            server
                .tools
                .get(namespaced_name)
                .ok_or_else(|| AgentError::ToolNotFound {
                    name: namespaced_name.to_string(),
                })?;

        let result = server
            .sink
            .call_tool({
                let mut params = CallToolRequestParam::new(raw_name.clone());
                if let Some(args) = arguments.as_object().cloned() {
                    params = params.with_arguments(args);
                }
                params
            })
            .await
            .map_err(|e| AgentError::Provider(format!("MCP call '{namespaced_name}' failed: {e}")))?;
        serde_json::to_value(result).map_err(AgentError::from)
    }
}
