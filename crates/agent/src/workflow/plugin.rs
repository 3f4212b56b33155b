//! Workflow plugin contract.
//!
//! A plugin is a pausable multi-step procedure. Its body runs as an async
//! task that yields [`WorkflowState`] records through the
//! [`WorkflowContext`] handle; `interrupt` suspends the body on a resume
//! channel until the runtime delivers a validated value, mirroring a
//! generator's `yield`/`next(value)` contract.

use crate::a2a::{Artifact, Part, TaskState};
use crate::error::{AgentError, AgentResult};
use crate::workflow::validation::InputValidator;
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as TokioMutex, mpsc};

/// Prefix of every synthetic workflow dispatch tool.
pub const DISPATCH_TOOL_PREFIX: &str = "dispatch_workflow_";

/// Why a workflow paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptReason {
    InputRequired,
    AuthRequired,
}

impl InterruptReason {
    pub fn task_state(&self) -> TaskState {
        match self {
            InterruptReason::InputRequired => TaskState::InputRequired,
            InterruptReason::AuthRequired => TaskState::AuthRequired,
        }
    }
}

/// A state record yielded by a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowState {
    /// Synchronous reply to the dispatching AI turn; only meaningful as
    /// the first yield and never re-emitted as an event.
    DispatchResponse { parts: Vec<Part> },
    /// Progress note; the task stays `working`.
    StatusUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Emit a chunk or blob.
    Artifact {
        artifact: Artifact,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        append: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_chunk: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    /// Pause awaiting a resume value.
    Interrupted {
        reason: InterruptReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_schema: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<Artifact>,
    },
    /// Terminal rejection.
    Reject { reason: String },
}

/// Execution-scoped handle a workflow body yields and suspends through.
#[derive(Clone)]
pub struct WorkflowContext {
    pub context_id: String,
    pub task_id: String,
    pub parameters: Value,
    pub metadata: Map<String, Value>,
    yields: mpsc::Sender<WorkflowState>,
    resume: Arc<TokioMutex<mpsc::Receiver<Value>>>,
}

impl WorkflowContext {
    pub(crate) fn new(
        context_id: String,
        task_id: String,
        parameters: Value,
        metadata: Map<String, Value>,
        yields: mpsc::Sender<WorkflowState>,
        resume: mpsc::Receiver<Value>,
    ) -> Self {
        Self {
            context_id,
            task_id,
            parameters,
            metadata,
            yields,
            resume: Arc::new(TokioMutex::new(resume)),
        }
    }

    /// Yield one state record to the runtime.
    pub async fn emit(&self, state: WorkflowState) -> anyhow::Result<()> {
        self.yields
            .send(state)
            .await
            .map_err(|_| anyhow!("workflow runtime dropped the yield channel"))
    }

    /// Yield the synchronous dispatch response for the parent AI turn.
    pub async fn dispatch_response(&self, parts: Vec<Part>) -> anyhow::Result<()> {
        self.emit(WorkflowState::DispatchResponse { parts }).await
    }

    /// Yield a progress note.
    pub async fn status(&self, message: impl Into<String>) -> anyhow::Result<()> {
        self.emit(WorkflowState::StatusUpdate {
            message: Some(message.into()),
        })
        .await
    }

    /// Yield an artifact chunk.
    pub async fn artifact(&self, artifact: Artifact) -> anyhow::Result<()> {
        self.emit(WorkflowState::Artifact {
            artifact,
            append: None,
            last_chunk: None,
            metadata: None,
        })
        .await
    }

    /// Pause until the runtime delivers a validated resume value.
    pub async fn interrupt(
        &self,
        reason: InterruptReason,
        message: Option<String>,
        input_schema: Option<Value>,
    ) -> anyhow::Result<Value> {
        self.emit(WorkflowState::Interrupted {
            reason,
            message,
            input_schema,
            artifact: None,
        })
        .await?;
        self.resume
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| anyhow!("workflow runtime dropped the resume channel"))
    }

    /// Reject the task terminally. The body should return promptly after
    /// this; anything it does afterwards is discarded.
    pub async fn reject(&self, reason: impl Into<String>) -> anyhow::Result<()> {
        self.emit(WorkflowState::Reject {
            reason: reason.into(),
        })
        .await
    }
}

/// A registered, schema-described, pausable multi-step procedure.
#[async_trait]
pub trait WorkflowPlugin: Send + Sync {
    /// Registration id; canonicalized to `^[a-z][a-z0-9_]*$`.
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn version(&self) -> &str;

    /// Structural validator for dispatch parameters, if any.
    fn input_validator(&self) -> Option<Arc<dyn InputValidator>> {
        None
    }

    /// How long a dispatcher waits for the first `dispatch-response` yield.
    fn dispatch_response_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// The workflow body. The returned value is the final result recorded
    /// on the execution.
    async fn run(&self, ctx: WorkflowContext) -> anyhow::Result<Value>;
}

/// Validate and canonicalize a plugin id: trimmed, lowercase,
/// `^[a-z][a-z0-9_-]*$`, hyphens folded to underscores.
pub fn canonical_plugin_id(raw: &str) -> AgentResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidPluginId {
            id: raw.to_string(),
            reason: "id is empty".to_string(),
        });
    }
    let mut chars = trimmed.chars();
    let first = chars.next().expect("non-empty");
    if !first.is_ascii_lowercase() {
        return Err(AgentError::InvalidPluginId {
            id: raw.to_string(),
            reason: "id must start with a lowercase letter".to_string(),
        });
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(AgentError::InvalidPluginId {
            id: raw.to_string(),
            reason: "id may only contain lowercase letters, digits, '_' and '-'".to_string(),
        });
    }
    Ok(trimmed.replace('-', "_"))
}

/// The synthetic tool name a workflow is dispatched through.
pub fn dispatch_tool_name(canonical_id: &str) -> String {
    format!("{DISPATCH_TOOL_PREFIX}{canonical_id}")
}

/// Inverse of [`dispatch_tool_name`]: `None` for non-dispatch tools.
pub fn plugin_id_from_tool_name(tool_name: &str) -> Option<&str> {
    tool_name.strip_prefix(DISPATCH_TOOL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Id canonicalization ────────────────────────────────────────────────

    #[test]
    fn hyphens_fold_to_underscores() {
        assert_eq!(canonical_plugin_id("my-flow").unwrap(), "my_flow");
        assert_eq!(canonical_plugin_id("my_flow").unwrap(), "my_flow");
        assert_eq!(canonical_plugin_id("  spaced  ").unwrap(), "spaced");
    }

    #[test]
    fn ids_must_start_with_lowercase_letter() {
        assert!(canonical_plugin_id("1flow").is_err());
        assert!(canonical_plugin_id("_flow").is_err());
        assert!(canonical_plugin_id("Flow").is_err());
        assert!(canonical_plugin_id("").is_err());
        assert!(canonical_plugin_id("   ").is_err());
    }

    #[test]
    fn ids_reject_forbidden_characters() {
        assert!(canonical_plugin_id("my flow").is_err());
        assert!(canonical_plugin_id("my.flow").is_err());
        assert!(canonical_plugin_id("myFlow").is_err());
    }

    // ── Tool naming ────────────────────────────────────────────────────────

    #[test]
    fn dispatch_tool_round_trip() {
        let name = dispatch_tool_name("trading");
        assert_eq!(name, "dispatch_workflow_trading");
        assert_eq!(plugin_id_from_tool_name(&name), Some("trading"));
        assert_eq!(plugin_id_from_tool_name("web__search"), None);
    }

    // ── Serde shapes ───────────────────────────────────────────────────────

    #[test]
    fn interrupted_state_round_trips() {
        let state = WorkflowState::Interrupted {
            reason: InterruptReason::InputRequired,
            message: Some("need your age".to_string()),
            input_schema: Some(serde_json::json!({"type": "object"})),
            artifact: None,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "interrupted");
        assert_eq!(json["reason"], "input-required");

        let back: WorkflowState = serde_json::from_value(json).unwrap();
        assert!(matches!(
            back,
            WorkflowState::Interrupted {
                reason: InterruptReason::InputRequired,
                ..
            }
        ));
    }

    #[test]
    fn interrupt_reason_maps_to_paused_states() {
        assert_eq!(
            InterruptReason::InputRequired.task_state(),
            TaskState::InputRequired
        );
        assert_eq!(
            InterruptReason::AuthRequired.task_state(),
            TaskState::AuthRequired
        );
    }
}
