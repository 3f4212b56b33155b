//! Wires a manifest, a provider, and workflow plugins into a runnable
//! agent.

use crate::api::AgentApp;
use crate::config::AgentManifest;
use crate::context::ContextManager;
use crate::event_bus::EventBusRegistry;
use crate::handlers::{AgentExecutor, AiHandler, WorkflowHandler};
use crate::tools::{McpToolCatalog, ToolCatalog, ToolRegistry};
use crate::workflow::{WorkflowPlugin, WorkflowRuntime};
use agentry::StreamingChatProvider;
use anyhow::Result;
use std::sync::Arc;

pub struct AgentBuilder {
    manifest: AgentManifest,
    provider: Arc<dyn StreamingChatProvider>,
    plugins: Vec<Arc<dyn WorkflowPlugin>>,
    catalog: Option<Arc<dyn ToolCatalog>>,
}

impl AgentBuilder {
    pub fn new(manifest: AgentManifest, provider: Arc<dyn StreamingChatProvider>) -> Self {
        Self {
            manifest,
            provider,
            plugins: Vec::new(),
            catalog: None,
        }
    }

    /// Offer a workflow plugin. Only plugins referenced by a skill in the
    /// manifest are registered.
    pub fn with_plugin(mut self, plugin: Arc<dyn WorkflowPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Replace the MCP catalog (tests use a fake here; the default
    /// connects to the manifest's servers).
    pub fn with_catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn build(self) -> Result<Arc<AgentApp>> {
        let manifest = self.manifest;
        let effective = manifest.effective_workflows();

        let runtime = Arc::new(WorkflowRuntime::new());
        for plugin in self.plugins {
            let canonical = crate::workflow::canonical_plugin_id(plugin.id())?;
            if effective.iter().any(|id| *id == canonical) {
                runtime.register(plugin)?;
            } else {
                log::warn!("workflow '{canonical}' offered but no skill attaches it; skipping");
            }
        }

        let catalog: Arc<dyn ToolCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let servers = manifest.effective_mcp_servers();
                if servers.is_empty() {
                    Arc::new(McpToolCatalog::empty())
                } else {
                    Arc::new(McpToolCatalog::connect(&servers).await?)
                }
            }
        };

        let workflows = Arc::new(WorkflowHandler::new(runtime.clone()));
        let registry = Arc::new(ToolRegistry::new(
            catalog,
            runtime.clone(),
            workflows.clone(),
        ));
        let contexts = Arc::new(ContextManager::new());
        let system_prompt = manifest.compose_system_prompt()?;
        let ai = Arc::new(AiHandler::new(
            contexts.clone(),
            self.provider,
            registry,
            Some(system_prompt),
        ));
        let executor = Arc::new(AgentExecutor::new(contexts.clone(), ai, workflows));

        Ok(Arc::new(AgentApp {
            executor,
            contexts,
            runtime,
            buses: Arc::new(EventBusRegistry::new()),
            card: manifest.compose_agent_card(),
        }))
    }
}
