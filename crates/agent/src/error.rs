//! Structured error type for the runtime.
//!
//! Every variant carries typed context and maps to a specific JSON-RPC
//! error code via the `From<AgentError> for rpc::ErrorObject` impl, so
//! the transport layer never invents codes ad hoc.

use crate::a2a::{TaskState, rpc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured, serializable error type for the runtime.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AgentError {
    // --- Not-found ---
    #[error("context not found: {context_id}")]
    ContextNotFound { context_id: String, hint: String },

    #[error("workflow plugin not found: {plugin_id}")]
    PluginNotFound { plugin_id: String },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    // --- Validation ---
    #[error("invalid workflow plugin id '{id}': {reason}")]
    InvalidPluginId { id: String, reason: String },

    #[error("workflow plugin already registered: {canonical_id}")]
    DuplicatePlugin { canonical_id: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("workflow yielded an invalid state: {reason}")]
    InvalidWorkflowYield { reason: String },

    // --- Task lifecycle ---
    #[error("invalid task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("task {task_id} is not paused (state: {state})")]
    TaskNotPaused { task_id: String, state: TaskState },

    #[error("workflow runtime is shutting down")]
    ShuttingDown,

    // --- Provider / transport ---
    #[error("provider error: {0}")]
    Provider(String),

    #[error("method not implemented: {method}")]
    MethodNotImplemented { method: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    // --- Generic internal ---
    #[error("internal error: {0}")]
    Internal(String),
}

/// Map each `AgentError` variant to the appropriate JSON-RPC error code.
///
/// | Code    | JSON-RPC meaning | Used for                                  |
/// |---------|------------------|-------------------------------------------|
/// | -32600  | InvalidRequest   | `ContextNotFound` (with contextId + hint) |
/// | -32601  | MethodNotFound   | `MethodNotImplemented`                    |
/// | -32602  | InvalidParams    | other not-found and validation errors     |
/// | -32603  | InternalError    | everything else                           |
impl From<AgentError> for rpc::ErrorObject {
    fn from(e: AgentError) -> Self {
        let (code, data) = match &e {
            AgentError::ContextNotFound { context_id, hint } => (
                rpc::INVALID_REQUEST,
                Some(serde_json::json!({"contextId": context_id, "hint": hint})),
            ),
            AgentError::MethodNotImplemented { .. } => (rpc::METHOD_NOT_FOUND, None),
            AgentError::PluginNotFound { .. }
            | AgentError::TaskNotFound { .. }
            | AgentError::ToolNotFound { .. }
            | AgentError::TaskNotPaused { .. }
            | AgentError::InvalidPluginId { .. }
            | AgentError::DuplicatePlugin { .. }
            | AgentError::InvalidInput { .. } => (rpc::INVALID_PARAMS, None),
            _ => (rpc::INTERNAL_ERROR, None),
        };
        rpc::ErrorObject {
            code,
            message: e.to_string(),
            data,
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl From<agentry::LlmError> for AgentError {
    fn from(e: agentry::LlmError) -> Self {
        AgentError::Provider(e.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ── From<AgentError> for rpc::ErrorObject ──────────────────────────────

    #[test]
    fn context_not_found_maps_to_invalid_request_with_data() {
        let err: rpc::ErrorObject = AgentError::ContextNotFound {
            context_id: "ctx-missing".to_string(),
            hint: "omit contextId to create a new context".to_string(),
        }
        .into();
        assert_eq!(err.code, rpc::INVALID_REQUEST);
        let data = err.data.expect("data");
        assert_eq!(data["contextId"], "ctx-missing");
        assert!(data["hint"].as_str().unwrap().contains("omit contextId"));
    }

    #[test]
    fn method_not_implemented_maps_to_method_not_found() {
        let err: rpc::ErrorObject = AgentError::MethodNotImplemented {
            method: "tasks/cancel".to_string(),
        }
        .into();
        assert_eq!(err.code, rpc::METHOD_NOT_FOUND);
        assert!(err.message.contains("tasks/cancel"));
    }

    #[test]
    fn plugin_not_found_maps_to_invalid_params() {
        let err: rpc::ErrorObject = AgentError::PluginNotFound {
            plugin_id: "trading".to_string(),
        }
        .into();
        assert_eq!(err.code, rpc::INVALID_PARAMS);
        assert!(err.message.contains("trading"));
    }

    #[test]
    fn invalid_transition_maps_to_internal_error() {
        let err: rpc::ErrorObject = AgentError::InvalidTransition {
            task_id: "t1".to_string(),
            from: TaskState::Completed,
            to: TaskState::Working,
        }
        .into();
        assert_eq!(err.code, rpc::INTERNAL_ERROR);
        assert!(err.message.contains("completed -> working"));
    }

    #[test]
    fn task_not_paused_maps_to_invalid_params() {
        let err: rpc::ErrorObject = AgentError::TaskNotPaused {
            task_id: "t2".to_string(),
            state: TaskState::Working,
        }
        .into();
        assert_eq!(err.code, rpc::INVALID_PARAMS);
        assert!(err.message.contains("working"));
    }

    // ── From conversions ───────────────────────────────────────────────────

    #[test]
    fn from_anyhow_error() {
        let err: AgentError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AgentError::Internal(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ bad").unwrap_err();
        let err: AgentError = json_err.into();
        assert!(matches!(err, AgentError::Serialization(_)));
    }

    #[test]
    fn from_llm_error_wraps_as_provider() {
        let err: AgentError = agentry::LlmError::Provider("overloaded".to_string()).into();
        assert!(matches!(err, AgentError::Provider(_)));
        assert!(err.to_string().contains("overloaded"));
    }

    // ── Serde round-trip ───────────────────────────────────────────────────

    #[test]
    fn agent_error_serde_round_trip() {
        let original = AgentError::InvalidTransition {
            task_id: "t-9".to_string(),
            from: TaskState::Submitted,
            to: TaskState::Completed,
        };
        let json = serde_json::to_string(&original).expect("serialize");
        let restored: AgentError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(original.to_string(), restored.to_string());
    }
}
