//! Tool surface for the model.
//!
//! The registry merges two tool families: MCP tools namespaced
//! `{server}__{tool}`, and the synthetic `dispatch_workflow_*` tools the
//! workflow runtime derives from registered plugins. Execution routes to
//! the owning MCP server or to the workflow handler respectively.

mod mcp;
mod registry;

pub use mcp::{
    CatalogClientHandler, McpServerConfig, McpToolCatalog, McpTransportConfig, ToolCatalog,
    canonical_namespace, namespaced_tool_name, split_namespaced,
};
pub use registry::ToolRegistry;
