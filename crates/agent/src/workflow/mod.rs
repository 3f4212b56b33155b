//! Pausable workflow runtime.
//!
//! Workflows are registered plugins addressable through synthetic
//! `dispatch_workflow_*` tools. A running workflow yields typed state
//! records to the runtime over a channel; the runtime turns them into
//! execution events, enforces the task state machine, and supports
//! pause-for-input with schema-validated resume.

mod plugin;
mod runtime;
mod validation;

pub use plugin::{
    DISPATCH_TOOL_PREFIX, InterruptReason, WorkflowContext, WorkflowPlugin, WorkflowState,
    canonical_plugin_id, dispatch_tool_name, plugin_id_from_tool_name,
};
pub use runtime::{
    DEFAULT_DISPATCH_RESPONSE_TIMEOUT, DispatchContext, ExecutionEvent, PauseInfo, ResumeOutcome,
    WorkflowExecution, WorkflowRuntime,
};
pub use validation::{InputValidator, SchemaValidator, ValidationIssue};
