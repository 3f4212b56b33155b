//! Drives one provider stream to completion.
//!
//! The processor is a blast-wall: whatever happens inside the stream —
//! normal completion, an empty sequence, or a mid-stream error — becomes
//! exactly one terminal status-update on the bus followed by exactly one
//! `finished()`.

use crate::a2a::{Message, Part, TaskEvent, TaskState, TaskStatus};
use crate::error::AgentResult;
use crate::event_bus::TaskEventBus;
use crate::stream::handler::StreamEventHandler;
use crate::workflow::plugin_id_from_tool_name;
use agentry::{ChatMessage, EventStream, StreamEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Executes `dispatch_workflow_*` tool calls observed in the stream.
///
/// The returned value is surfaced to the model as the tool's result; a
/// workflow dispatch returns the `{taskId, metadata, result}` shape the
/// handler recognizes.
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    async fn dispatch_workflow(
        &self,
        tool_name: &str,
        arguments: Value,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Value>;
}

/// Drive the stream, returning the assembled assistant message (reasoning
/// before text), or `None` when the stream produced nothing.
pub async fn process_stream(
    mut stream: EventStream,
    task_id: &str,
    context_id: &str,
    bus: Arc<TaskEventBus>,
    dispatcher: Option<Arc<dyn WorkflowDispatcher>>,
) -> Option<ChatMessage> {
    let mut handler = StreamEventHandler::new(task_id, context_id, bus.clone());

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(error) => {
                log::warn!("stream[{task_id}]: provider error: {error}");
                publish_failure(&bus, task_id, context_id, error.to_string());
                bus.finished();
                return None;
            }
        };

        if let Err(error) = handler.handle_event(&event) {
            log::error!("stream[{task_id}]: {error}");
            publish_failure(&bus, task_id, context_id, error.to_string());
            bus.finished();
            return None;
        }

        // A dispatch-tool call is executed here, and its response fed back
        // through the handler as the tool's result.
        if let StreamEvent::ToolCall {
            id,
            tool_name: Some(tool_name),
            input,
        } = &event
        {
            if plugin_id_from_tool_name(tool_name).is_some() {
                if let Some(dispatcher) = &dispatcher {
                    let output = match dispatcher
                        .dispatch_workflow(
                            tool_name,
                            input.clone().unwrap_or(Value::Null),
                            bus.clone(),
                        )
                        .await
                    {
                        Ok(output) => output,
                        Err(error) => {
                            log::warn!("stream[{task_id}]: workflow dispatch failed: {error}");
                            serde_json::json!({"error": error.to_string()})
                        }
                    };
                    let result_event = StreamEvent::ToolResult {
                        id: id.clone(),
                        tool_name: Some(tool_name.clone()),
                        output: Some(output),
                    };
                    if let Err(error) = handler.handle_event(&result_event) {
                        log::error!("stream[{task_id}]: {error}");
                    }
                } else {
                    log::warn!(
                        "stream[{task_id}]: {tool_name} called but no workflow dispatcher is wired"
                    );
                }
            }
        }
    }

    handler.flush();

    let status = if handler.published_count() == 0 {
        TaskStatus::new(TaskState::Completed)
    } else {
        TaskStatus::new(TaskState::Completed).stamped()
    };
    bus.publish(TaskEvent::StatusUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        status,
        is_final: true,
        metadata: None,
    });
    bus.finished();

    assemble_message(&handler)
}

fn publish_failure(bus: &TaskEventBus, task_id: &str, context_id: &str, message: String) {
    bus.publish(TaskEvent::StatusUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        status: TaskStatus {
            state: TaskState::Failed,
            message: Some(Message {
                role: crate::a2a::MessageRole::Agent,
                parts: vec![Part::text(message)],
                message_id: None,
                task_id: Some(task_id.to_string()),
                context_id: Some(context_id.to_string()),
                reference_task_ids: Vec::new(),
                metadata: None,
            }),
            timestamp: Some(time::OffsetDateTime::now_utc()),
        },
        is_final: true,
        metadata: None,
    });
}

/// Reasoning before text; some providers reject assistant messages with
/// the opposite ordering. `None` when both are empty.
fn assemble_message(handler: &StreamEventHandler) -> Option<ChatMessage> {
    let mut builder = ChatMessage::assistant();
    if !handler.accumulated_reasoning().is_empty() {
        builder = builder.reasoning(handler.accumulated_reasoning());
    }
    if !handler.accumulated_text().is_empty() {
        builder = builder.text(handler.accumulated_text());
    }
    let message = builder.build();
    if message.content.is_empty() {
        None
    } else {
        Some(message)
    }
}
