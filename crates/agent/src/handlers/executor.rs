//! Transport entry point.
//!
//! Every inbound A2A message lands here. A message targeting a paused
//! task resumes its workflow; everything else is an AI turn against a
//! (possibly fresh) context.

use crate::a2a::{Message, Part, TaskEvent, TaskState, TaskStatus};
use crate::context::ContextManager;
use crate::error::{AgentError, AgentResult};
use crate::event_bus::TaskEventBus;
use crate::handlers::ai::AiHandler;
use crate::handlers::workflow::WorkflowHandler;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// What the transport extracted from one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub message: Message,
    pub context_id: Option<String>,
    pub task_id: Option<String>,
}

/// Where the executor routed a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    AiTurn { context_id: String, task_id: String },
    WorkflowResume { task_id: String },
}

pub struct AgentExecutor {
    contexts: Arc<ContextManager>,
    ai: Arc<AiHandler>,
    workflows: Arc<WorkflowHandler>,
}

impl AgentExecutor {
    pub fn new(
        contexts: Arc<ContextManager>,
        ai: Arc<AiHandler>,
        workflows: Arc<WorkflowHandler>,
    ) -> Self {
        Self {
            contexts,
            ai,
            workflows,
        }
    }

    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    /// Handle one inbound message, publishing all resulting events on
    /// `bus`. Returns how the request was routed.
    #[instrument(name = "agent.execute", skip(self, request, bus))]
    pub async fn execute(
        &self,
        request: RequestContext,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Routed> {
        if let Some(task_id) = &request.task_id {
            let runtime = self.workflows.runtime();
            if runtime.is_paused(task_id) {
                let input = resume_input(&request.message);
                self.workflows
                    .resume_workflow(task_id, input, bus)
                    .await?;
                return Ok(Routed::WorkflowResume {
                    task_id: task_id.clone(),
                });
            }
            if let Some(state) = runtime.task_state(task_id) {
                // A live or settled task that is not paused cannot accept
                // another message.
                return Err(AgentError::TaskNotPaused {
                    task_id: task_id.clone(),
                    state,
                });
            }
        }

        // Unknown client-supplied context ids still fail here.
        let context = self
            .contexts
            .get_or_create_context(request.context_id.as_deref())?;
        let context_id = context.context_id;
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| format!("task-{}", Uuid::now_v7()));
        self.contexts.add_task(&context_id, &task_id)?;

        bus.publish(TaskEvent::Task {
            id: task_id.clone(),
            context_id: context_id.clone(),
            status: TaskStatus::new(TaskState::Submitted).stamped(),
            artifacts: Vec::new(),
        });
        bus.publish(TaskEvent::StatusUpdate {
            task_id: task_id.clone(),
            context_id: context_id.clone(),
            status: TaskStatus::new(TaskState::Working).stamped(),
            is_final: false,
            metadata: None,
        });

        let text = request.message.text();
        self.ai
            .handle_streaming(&text, &context_id, &task_id, bus)
            .await?;

        Ok(Routed::AiTurn {
            context_id,
            task_id,
        })
    }
}

/// The resume value carried by a message targeting a paused task: the
/// first data part if present, otherwise the concatenated text.
fn resume_input(message: &Message) -> Value {
    message
        .parts
        .iter()
        .find_map(|part| match part {
            Part::Data { data, .. } => Some(data.clone()),
            Part::Text { .. } => None,
        })
        .unwrap_or_else(|| Value::String(message.text()))
}
