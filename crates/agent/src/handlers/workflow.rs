//! Bridges AI-dispatched workflow tool calls into the workflow runtime.
//!
//! A dispatch publishes the child task's `task` and first `status-update`
//! on the *parent* AI task's bus, forwards the execution's events under
//! the child's ids, and returns the synchronous dispatch response the
//! model sees as the tool result. A resume re-attaches forwarding until
//! the next pause or terminal event.

use crate::a2a::{Message, MessageRole, Part, TaskEvent, TaskState, TaskStatus};
use crate::artifacts::WorkflowDispatchResponse;
use crate::error::{AgentError, AgentResult};
use crate::event_bus::TaskEventBus;
use crate::stream::WorkflowDispatcher;
use crate::workflow::{
    DispatchContext, ExecutionEvent, PauseInfo, ResumeOutcome, WorkflowRuntime, WorkflowState,
    plugin_id_from_tool_name,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct WorkflowHandler {
    runtime: Arc<WorkflowRuntime>,
}

impl WorkflowHandler {
    pub fn new(runtime: Arc<WorkflowRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<WorkflowRuntime> {
        &self.runtime
    }

    /// Resume a paused child task with a client-supplied input value,
    /// forwarding subsequent execution events (under the child's ids)
    /// until the next pause or terminal event, then finishing the bus.
    pub async fn resume_workflow(
        &self,
        task_id: &str,
        input: Value,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<ResumeOutcome> {
        let execution =
            self.runtime
                .get_execution(task_id)
                .ok_or_else(|| AgentError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;
        // Attach before resuming so the next pause/terminal cannot slip by.
        let rx = execution.subscribe_live();
        let outcome = self.runtime.resume_workflow(task_id, input)?;

        let child_task = execution.task_id.clone();
        let child_context = execution.context_id.clone();
        if matches!(outcome, ResumeOutcome::Resumed { .. }) {
            bus.publish(TaskEvent::StatusUpdate {
                task_id: child_task.clone(),
                context_id: child_context.clone(),
                status: TaskStatus::new(TaskState::Working).stamped(),
                is_final: false,
                metadata: None,
            });
        }
        // Forward inline: the resume turn settles (next pause or terminal)
        // before this returns, so callers can snapshot the bus afterwards.
        forward_events(bus, child_task, child_context, Vec::new(), rx, true).await;
        Ok(outcome)
    }
}

#[async_trait]
impl WorkflowDispatcher for WorkflowHandler {
    async fn dispatch_workflow(
        &self,
        tool_name: &str,
        arguments: Value,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Value> {
        let plugin_id =
            plugin_id_from_tool_name(tool_name).ok_or_else(|| AgentError::InvalidInput {
                reason: format!("'{tool_name}' is not a workflow dispatch tool"),
            })?;
        let plugin =
            self.runtime
                .get_plugin(plugin_id)
                .ok_or_else(|| AgentError::PluginNotFound {
                    plugin_id: plugin_id.to_string(),
                })?;

        // Child tasks get their own conversation scope.
        let child_context_id = format!("ctx-{}", Uuid::now_v7());
        let execution = self.runtime.dispatch(
            plugin_id,
            DispatchContext {
                context_id: child_context_id.clone(),
                task_id: None,
                parameters: arguments,
                metadata: Map::new(),
            },
        )?;
        let child_task_id = execution.task_id.clone();

        bus.publish(TaskEvent::Task {
            id: child_task_id.clone(),
            context_id: child_context_id.clone(),
            status: TaskStatus::new(TaskState::Submitted).stamped(),
            artifacts: Vec::new(),
        });
        bus.publish(TaskEvent::StatusUpdate {
            task_id: child_task_id.clone(),
            context_id: child_context_id.clone(),
            status: TaskStatus::new(TaskState::Working).stamped(),
            is_final: false,
            metadata: None,
        });

        let (backlog, rx) = execution.subscribe();
        tokio::spawn(forward_events(
            bus.clone(),
            child_task_id.clone(),
            child_context_id.clone(),
            backlog,
            rx,
            false,
        ));

        let first = self
            .runtime
            .wait_for_first_yield(&child_task_id, plugin.dispatch_response_timeout())
            .await;
        let result = match first {
            Some(WorkflowState::DispatchResponse { parts }) => parts,
            _ => Vec::new(),
        };

        let mut metadata = Map::new();
        metadata.insert("workflowName".to_string(), json!(plugin.name()));
        metadata.insert("description".to_string(), json!(plugin.description()));
        metadata.insert("pluginId".to_string(), json!(plugin_id));

        Ok(WorkflowDispatchResponse {
            task_id: child_task_id,
            metadata,
            result,
        }
        .to_value())
    }
}

/// Forward execution events as A2A events under the child's ids, stopping
/// after a pause or terminal event. `finish_bus` marks the forwarding
/// spawned for a resume turn, where the bus belongs to this forwarder.
async fn forward_events(
    bus: Arc<TaskEventBus>,
    task_id: String,
    context_id: String,
    backlog: Vec<ExecutionEvent>,
    mut rx: broadcast::Receiver<ExecutionEvent>,
    finish_bus: bool,
) {
    let mut settled = false;
    for event in backlog {
        if forward_one(&bus, &task_id, &context_id, event) {
            settled = true;
            break;
        }
    }
    while !settled {
        match rx.recv().await {
            Ok(event) => {
                if forward_one(&bus, &task_id, &context_id, event) {
                    settled = true;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("forwarder for {task_id} lagged by {missed} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    if finish_bus {
        bus.finished();
    }
}

/// Publish one execution event on the bus. Returns true when forwarding
/// should stop (pause or terminal).
fn forward_one(
    bus: &TaskEventBus,
    task_id: &str,
    context_id: &str,
    event: ExecutionEvent,
) -> bool {
    match event {
        ExecutionEvent::Update { message } => {
            let status = match message {
                Some(text) => TaskStatus::new(TaskState::Working)
                    .with_message(child_message(task_id, context_id, Part::text(text)))
                    .stamped(),
                None => TaskStatus::new(TaskState::Working).stamped(),
            };
            bus.publish(TaskEvent::StatusUpdate {
                task_id: task_id.to_string(),
                context_id: context_id.to_string(),
                status,
                is_final: false,
                metadata: None,
            });
            false
        }
        ExecutionEvent::Artifact {
            artifact,
            append,
            last_chunk,
            metadata: _,
        } => {
            bus.publish(TaskEvent::ArtifactUpdate {
                task_id: task_id.to_string(),
                context_id: context_id.to_string(),
                artifact,
                append,
                last_chunk,
            });
            false
        }
        ExecutionEvent::Pause {
            pause,
            validation_errors,
        } => {
            bus.publish(pause_status(task_id, context_id, &pause, validation_errors));
            true
        }
        ExecutionEvent::Done { result } => {
            let status = if result.is_null() {
                TaskStatus::new(TaskState::Completed).stamped()
            } else {
                TaskStatus::new(TaskState::Completed)
                    .with_message(child_message(task_id, context_id, Part::data(result)))
                    .stamped()
            };
            bus.publish(TaskEvent::StatusUpdate {
                task_id: task_id.to_string(),
                context_id: context_id.to_string(),
                status,
                is_final: true,
                metadata: None,
            });
            true
        }
        ExecutionEvent::Error { message } => {
            bus.publish(TaskEvent::StatusUpdate {
                task_id: task_id.to_string(),
                context_id: context_id.to_string(),
                status: TaskStatus::new(TaskState::Failed)
                    .with_message(child_message(task_id, context_id, Part::text(message)))
                    .stamped(),
                is_final: true,
                metadata: None,
            });
            true
        }
        ExecutionEvent::Reject { reason } => {
            bus.publish(TaskEvent::StatusUpdate {
                task_id: task_id.to_string(),
                context_id: context_id.to_string(),
                status: TaskStatus::new(TaskState::Rejected)
                    .with_message(child_message(task_id, context_id, Part::text(reason)))
                    .stamped(),
                is_final: true,
                metadata: None,
            });
            true
        }
    }
}

fn child_message(task_id: &str, context_id: &str, part: Part) -> Message {
    Message {
        role: MessageRole::Agent,
        parts: vec![part],
        message_id: None,
        task_id: Some(task_id.to_string()),
        context_id: Some(context_id.to_string()),
        reference_task_ids: Vec::new(),
        metadata: None,
    }
}

fn pause_status(
    task_id: &str,
    context_id: &str,
    pause: &PauseInfo,
    validation_errors: Option<Vec<crate::workflow::ValidationIssue>>,
) -> TaskEvent {
    let mut metadata = Map::new();
    if let Some(schema) = &pause.input_schema {
        metadata.insert("inputSchema".to_string(), schema.clone());
    }
    if let Some(errors) = validation_errors {
        metadata.insert(
            "validationErrors".to_string(),
            serde_json::to_value(errors).unwrap_or(Value::Null),
        );
    }
    let status = match &pause.message {
        Some(text) => TaskStatus::new(pause.state)
            .with_message(child_message(task_id, context_id, Part::text(text.clone())))
            .stamped(),
        None => TaskStatus::new(pause.state).stamped(),
    };
    TaskEvent::StatusUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        status,
        is_final: false,
        metadata: if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        },
    }
}
