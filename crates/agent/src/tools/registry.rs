//! Tool registry: the merged tool surface handed to the model.

use crate::error::{AgentError, AgentResult};
use crate::event_bus::TaskEventBus;
use crate::stream::WorkflowDispatcher;
use crate::tools::mcp::ToolCatalog;
use crate::workflow::{WorkflowRuntime, plugin_id_from_tool_name};
use agentry::Tool;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Merges the MCP catalog with the runtime's workflow dispatch tools and
/// routes execution to the owning manager.
pub struct ToolRegistry {
    catalog: Arc<dyn ToolCatalog>,
    runtime: Arc<WorkflowRuntime>,
    dispatcher: Arc<dyn WorkflowDispatcher>,
}

impl ToolRegistry {
    pub fn new(
        catalog: Arc<dyn ToolCatalog>,
        runtime: Arc<WorkflowRuntime>,
        dispatcher: Arc<dyn WorkflowDispatcher>,
    ) -> Self {
        Self {
            catalog,
            runtime,
            dispatcher,
        }
    }

    /// Every tool the model may call this turn: MCP tools first, then one
    /// dispatch tool per registered workflow.
    pub fn definitions(&self) -> Vec<Tool> {
        let mut tools = self.catalog.tools();
        tools.extend(self.runtime.dispatch_tools());
        tools
    }

    pub fn find(&self, name: &str) -> Option<Tool> {
        self.definitions()
            .into_iter()
            .find(|tool| tool.function.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions()
            .into_iter()
            .map(|tool| tool.function.name)
            .collect()
    }

    /// Execute one tool call: dispatch tools go to the workflow handler,
    /// namespaced tools to their MCP server.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Value> {
        if plugin_id_from_tool_name(name).is_some() {
            self.dispatcher
                .dispatch_workflow(name, arguments, bus)
                .await
        } else if self.find(name).is_some() {
            self.catalog.call_tool(name, arguments).await
        } else {
            Err(AgentError::ToolNotFound {
                name: name.to_string(),
            })
        }
    }
}

#[async_trait]
impl WorkflowDispatcher for ToolRegistry {
    async fn dispatch_workflow(
        &self,
        tool_name: &str,
        arguments: Value,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Value> {
        self.dispatcher
            .dispatch_workflow(tool_name, arguments, bus)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{WorkflowContext, WorkflowPlugin};
    use serde_json::json;

    struct FakeCatalog;

    #[async_trait]
    impl ToolCatalog for FakeCatalog {
        fn tools(&self) -> Vec<Tool> {
            vec![Tool::function(
                "web__search",
                "Search the web",
                json!({"type": "object"}),
            )]
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> AgentResult<Value> {
            Ok(json!({"called": name}))
        }
    }

    struct FakeDispatcher;

    #[async_trait]
    impl WorkflowDispatcher for FakeDispatcher {
        async fn dispatch_workflow(
            &self,
            tool_name: &str,
            _arguments: Value,
            _bus: Arc<TaskEventBus>,
        ) -> AgentResult<Value> {
            Ok(json!({"dispatched": tool_name}))
        }
    }

    struct NoopFlow;

    #[async_trait]
    impl WorkflowPlugin for NoopFlow {
        fn id(&self) -> &str {
            "noop"
        }
        fn name(&self) -> &str {
            "Noop"
        }
        fn description(&self) -> &str {
            "Does nothing"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        async fn run(&self, _ctx: WorkflowContext) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn registry() -> ToolRegistry {
        let runtime = Arc::new(WorkflowRuntime::new());
        runtime.register(Arc::new(NoopFlow)).unwrap();
        ToolRegistry::new(Arc::new(FakeCatalog), runtime, Arc::new(FakeDispatcher))
    }

    #[test]
    fn definitions_merge_both_families() {
        let names = registry().names();
        assert_eq!(names, vec!["web__search", "dispatch_workflow_noop"]);
    }

    #[test]
    fn find_locates_tools_across_families() {
        let registry = registry();
        assert!(registry.find("web__search").is_some());
        assert!(registry.find("dispatch_workflow_noop").is_some());
        assert!(registry.find("missing").is_none());
    }

    #[tokio::test]
    async fn execute_routes_mcp_tools_to_the_catalog() {
        let registry = registry();
        let bus = Arc::new(TaskEventBus::new("t1"));
        let result = registry
            .execute("web__search", json!({}), bus)
            .await
            .unwrap();
        assert_eq!(result["called"], "web__search");
    }

    #[tokio::test]
    async fn execute_routes_dispatch_tools_to_the_workflow_handler() {
        let registry = registry();
        let bus = Arc::new(TaskEventBus::new("t1"));
        let result = registry
            .execute("dispatch_workflow_noop", json!({}), bus)
            .await
            .unwrap();
        assert_eq!(result["dispatched"], "dispatch_workflow_noop");
    }

    #[tokio::test]
    async fn execute_unknown_tool_fails() {
        let registry = registry();
        let bus = Arc::new(TaskEventBus::new("t1"));
        let err = registry.execute("nope", json!({}), bus).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound { .. }));
    }
}
