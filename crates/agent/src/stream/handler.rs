//! Per-stream event routing.
//!
//! One handler instance lives for the duration of one AI stream. It
//! buffers the most recent text/reasoning chunk (so the final chunk can
//! be flagged `lastChunk` when the block ends), tracks tool calls by
//! position, and publishes artifact and status events on the task's bus.

use crate::a2a::{Message, TaskEvent, TaskState, TaskStatus};
use crate::artifacts::{
    TextArtifactKind, WorkflowDispatchResponse, streaming_text_artifact, tool_call_artifact,
    tool_result_artifact,
};
use crate::error::{AgentError, AgentResult};
use crate::event_bus::TaskEventBus;
use crate::workflow::plugin_id_from_tool_name;
use agentry::StreamEvent;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One tool invocation observed in the stream, newest last.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub artifact_id: String,
}

/// Per-stream state container and router.
pub struct StreamEventHandler {
    task_id: String,
    context_id: String,
    bus: Arc<TaskEventBus>,
    text_chunk_index: usize,
    reasoning_chunk_index: usize,
    buffered_artifact: Option<TaskEvent>,
    buffered_reasoning_artifact: Option<TaskEvent>,
    tool_call_artifacts: HashMap<usize, String>,
    delta_counters: HashMap<&'static str, usize>,
    accumulated_text: String,
    accumulated_reasoning: String,
    tool_calls: Vec<ToolCallRecord>,
    published: usize,
}

impl StreamEventHandler {
    pub fn new(task_id: &str, context_id: &str, bus: Arc<TaskEventBus>) -> Self {
        Self {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            bus,
            text_chunk_index: 0,
            reasoning_chunk_index: 0,
            buffered_artifact: None,
            buffered_reasoning_artifact: None,
            tool_call_artifacts: HashMap::new(),
            delta_counters: HashMap::new(),
            accumulated_text: String::new(),
            accumulated_reasoning: String::new(),
            tool_calls: Vec::new(),
            published: 0,
        }
    }

    /// Route one provider event.
    pub fn handle_event(&mut self, event: &StreamEvent) -> AgentResult<()> {
        match event {
            StreamEvent::TextDelta { text } => {
                self.on_text_delta(text.as_deref(), TextArtifactKind::TextResponse)
            }
            StreamEvent::ReasoningDelta { text } => {
                self.on_text_delta(text.as_deref(), TextArtifactKind::Reasoning)
            }
            StreamEvent::TextEnd => {
                self.on_block_end(TextArtifactKind::TextResponse);
                Ok(())
            }
            StreamEvent::ReasoningEnd => {
                self.on_block_end(TextArtifactKind::Reasoning);
                Ok(())
            }
            StreamEvent::ToolCall {
                tool_name, input, ..
            } => self.on_tool_call(tool_name.as_deref(), input.clone()),
            StreamEvent::ToolResult { output, .. } => {
                self.on_tool_result(output.clone());
                Ok(())
            }
            StreamEvent::ToolInputDelta { .. } => {
                *self.delta_counters.entry("tool-input-delta").or_insert(0) += 1;
                Ok(())
            }
            StreamEvent::ToolInputEnd => {
                self.delta_counters.insert("tool-input-delta", 0);
                Ok(())
            }
            StreamEvent::ReasoningStart => {
                log::debug!("stream[{}]: reasoning block started", self.task_id);
                Ok(())
            }
            StreamEvent::Unknown => {
                log::debug!("stream[{}]: ignoring unknown event kind", self.task_id);
                Ok(())
            }
        }
    }

    /// Flush any buffered chunk with `lastChunk = true`. Called once when
    /// the stream ends.
    pub fn flush(&mut self) {
        self.on_block_end(TextArtifactKind::TextResponse);
        self.on_block_end(TextArtifactKind::Reasoning);
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn accumulated_reasoning(&self) -> &str {
        &self.accumulated_reasoning
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    /// Number of events this handler has published on the bus.
    pub fn published_count(&self) -> usize {
        self.published
    }

    fn publish(&mut self, event: TaskEvent) {
        self.published += 1;
        self.bus.publish(event);
    }

    // ── Text and reasoning ─────────────────────────────────────────────────

    fn on_text_delta(&mut self, text: Option<&str>, kind: TextArtifactKind) -> AgentResult<()> {
        let Some(text) = text else {
            log::debug!("stream[{}]: {} delta without text", self.task_id, kind.as_str());
            return Ok(());
        };
        // Publish the previous chunk before building the next, so chunks
        // leave the bus strictly in order.
        if let Some(buffered) = self.take_buffer(kind) {
            self.publish(buffered);
        }
        let index = self.chunk_index(kind);
        let event = streaming_text_artifact(
            &self.task_id,
            &self.context_id,
            kind,
            text,
            index,
            false,
        );
        self.set_buffer(kind, event);
        match kind {
            TextArtifactKind::TextResponse => {
                self.accumulated_text.push_str(text);
                self.text_chunk_index += 1;
            }
            TextArtifactKind::Reasoning => {
                self.accumulated_reasoning.push_str(text);
                self.reasoning_chunk_index += 1;
            }
        }
        Ok(())
    }

    fn on_block_end(&mut self, kind: TextArtifactKind) {
        if let Some(mut buffered) = self.take_buffer(kind) {
            if let TaskEvent::ArtifactUpdate { last_chunk, .. } = &mut buffered {
                *last_chunk = true;
            }
            self.publish(buffered);
        }
    }

    fn chunk_index(&self, kind: TextArtifactKind) -> usize {
        match kind {
            TextArtifactKind::TextResponse => self.text_chunk_index,
            TextArtifactKind::Reasoning => self.reasoning_chunk_index,
        }
    }

    fn take_buffer(&mut self, kind: TextArtifactKind) -> Option<TaskEvent> {
        match kind {
            TextArtifactKind::TextResponse => self.buffered_artifact.take(),
            TextArtifactKind::Reasoning => self.buffered_reasoning_artifact.take(),
        }
    }

    fn set_buffer(&mut self, kind: TextArtifactKind, event: TaskEvent) {
        match kind {
            TextArtifactKind::TextResponse => self.buffered_artifact = Some(event),
            TextArtifactKind::Reasoning => self.buffered_reasoning_artifact = Some(event),
        }
    }

    // ── Tool calls ─────────────────────────────────────────────────────────

    fn on_tool_call(&mut self, tool_name: Option<&str>, input: Option<Value>) -> AgentResult<()> {
        let tool_name = tool_name.ok_or_else(|| AgentError::InvalidInput {
            reason: "tool-call event without toolName".to_string(),
        })?;
        let input = input.unwrap_or(Value::Null);
        let position = self.tool_calls.len();
        let (artifact_id, event) =
            tool_call_artifact(&self.task_id, &self.context_id, tool_name, &input);
        self.tool_calls.push(ToolCallRecord {
            name: tool_name.to_string(),
            artifact_id: artifact_id.clone(),
        });
        self.tool_call_artifacts.insert(position, artifact_id);
        if plugin_id_from_tool_name(tool_name).is_some() {
            // Workflow dispatches announce themselves through the parent
            // status update at result time, not through a call artifact.
            log::debug!(
                "stream[{}]: suppressing call artifact for {}",
                self.task_id,
                tool_name
            );
        } else {
            self.publish(event);
        }
        Ok(())
    }

    fn on_tool_result(&mut self, output: Option<Value>) {
        let Some(record) = self.tool_calls.pop() else {
            log::warn!(
                "stream[{}]: tool-result with no tool call on record",
                self.task_id
            );
            return;
        };
        let position = self.tool_calls.len();
        let output = output.unwrap_or(Value::Null);
        let event = tool_result_artifact(
            &self.task_id,
            &self.context_id,
            &record.artifact_id,
            &record.name,
            &output,
        );
        self.publish(event);

        if let Some(response) = WorkflowDispatchResponse::from_value(&output) {
            self.publish_dispatch_status(&record.name, &response);
        }
        self.tool_call_artifacts.remove(&position);
    }

    /// The parent-task status update linking a freshly dispatched child.
    /// `referenceTaskIds` carries exactly the new child — sequential
    /// dispatches never accumulate.
    fn publish_dispatch_status(&mut self, tool_name: &str, response: &WorkflowDispatchResponse) {
        let workflow_name = response
            .metadata
            .get("workflowName")
            .and_then(Value::as_str)
            .unwrap_or(tool_name)
            .to_string();
        let description = response
            .metadata
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut message = Message::agent_text(format!(
            "Dispatching workflow: {workflow_name} ({description})"
        ));
        message.task_id = Some(self.task_id.clone());
        message.context_id = Some(self.context_id.clone());
        message.reference_task_ids = vec![response.task_id.clone()];

        let mut metadata = Map::new();
        metadata.insert(
            "referencedWorkflow".to_string(),
            Value::Object(response.metadata.clone()),
        );

        self.publish(TaskEvent::StatusUpdate {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            status: TaskStatus::new(TaskState::Working).with_message(message),
            is_final: false,
            metadata: Some(metadata),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler() -> (StreamEventHandler, Arc<TaskEventBus>) {
        let bus = Arc::new(TaskEventBus::new("t1"));
        (StreamEventHandler::new("t1", "ctx-1", bus.clone()), bus)
    }

    // ── Text chunk buffering ───────────────────────────────────────────────

    #[test]
    fn two_deltas_and_end_publish_ordered_chunks() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::text_delta("Hello"))
            .unwrap();
        handler
            .handle_event(&StreamEvent::text_delta(" world"))
            .unwrap();
        handler.handle_event(&StreamEvent::TextEnd).unwrap();

        let events = bus.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            TaskEvent::ArtifactUpdate {
                artifact,
                append,
                last_chunk,
                ..
            } => {
                assert_eq!(artifact.artifact_id, "text-response-t1");
                assert!(!append);
                assert!(!last_chunk);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &events[1] {
            TaskEvent::ArtifactUpdate {
                append, last_chunk, ..
            } => {
                assert!(append);
                assert!(last_chunk);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(handler.accumulated_text(), "Hello world");
    }

    #[test]
    fn delta_without_text_is_ignored() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::TextDelta { text: None })
            .unwrap();
        assert!(bus.events().is_empty());
        assert_eq!(handler.accumulated_text(), "");
    }

    #[test]
    fn end_without_buffer_is_a_no_op() {
        let (mut handler, bus) = handler();
        handler.handle_event(&StreamEvent::TextEnd).unwrap();
        handler.handle_event(&StreamEvent::ReasoningEnd).unwrap();
        assert!(bus.events().is_empty());
    }

    #[test]
    fn reasoning_and_text_streams_are_independent() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::reasoning_delta("thinking"))
            .unwrap();
        handler
            .handle_event(&StreamEvent::text_delta("answer"))
            .unwrap();
        handler.handle_event(&StreamEvent::ReasoningEnd).unwrap();
        handler.handle_event(&StreamEvent::TextEnd).unwrap();

        let ids: Vec<String> = bus
            .events()
            .iter()
            .map(|event| match event {
                TaskEvent::ArtifactUpdate { artifact, .. } => artifact.artifact_id.clone(),
                other => panic!("unexpected: {other:?}"),
            })
            .collect();
        assert!(ids.contains(&"reasoning-t1".to_string()));
        assert!(ids.contains(&"text-response-t1".to_string()));
        assert_eq!(handler.accumulated_reasoning(), "thinking");
        assert_eq!(handler.accumulated_text(), "answer");
    }

    #[test]
    fn flush_marks_trailing_chunk_last() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::text_delta("dangling"))
            .unwrap();
        handler.flush();

        let events = bus.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TaskEvent::ArtifactUpdate { last_chunk, .. } => assert!(last_chunk),
            other => panic!("unexpected: {other:?}"),
        }
    }

    // ── Tool calls ─────────────────────────────────────────────────────────

    #[test]
    fn plain_tool_call_publishes_artifact() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::tool_call("c1", "web__search", json!({"q": "a2a"})))
            .unwrap();

        assert_eq!(handler.tool_calls().len(), 1);
        assert_eq!(bus.events().len(), 1);
    }

    #[test]
    fn workflow_tool_call_is_recorded_but_not_published() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::tool_call(
                "c1",
                "dispatch_workflow_trading",
                json!({}),
            ))
            .unwrap();

        assert_eq!(handler.tool_calls().len(), 1);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn tool_call_without_name_is_an_error() {
        let (mut handler, _bus) = handler();
        let err = handler
            .handle_event(&StreamEvent::ToolCall {
                id: Some("c1".to_string()),
                tool_name: None,
                input: None,
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput { .. }));
    }

    #[test]
    fn tool_result_pops_the_last_call() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::tool_call("c1", "web__search", json!({})))
            .unwrap();
        handler
            .handle_event(&StreamEvent::tool_result("c1", "web__search", json!({"hits": 3})))
            .unwrap();

        assert!(handler.tool_calls().is_empty());
        let events = bus.events();
        assert_eq!(events.len(), 2);
        match &events[1] {
            TaskEvent::ArtifactUpdate {
                artifact,
                last_chunk,
                ..
            } => {
                assert!(last_chunk);
                assert!(artifact.artifact_id.starts_with("tool-call-web__search-"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn orphan_tool_result_is_ignored() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::tool_result("c1", "web__search", json!({})))
            .unwrap();
        assert!(bus.events().is_empty());
    }

    // ── Workflow dispatch linkage ──────────────────────────────────────────

    fn dispatch_result(child: &str, name: &str) -> Value {
        json!({
            "taskId": child,
            "metadata": {
                "workflowName": name,
                "description": "does things",
                "pluginId": name.to_lowercase()
            },
            "result": [{"kind": "text", "text": "under way"}]
        })
    }

    #[test]
    fn dispatch_result_publishes_status_with_only_new_child() {
        let (mut handler, bus) = handler();
        for (tool, child, name) in [
            ("dispatch_workflow_trading", "task-child-1", "Trading"),
            ("dispatch_workflow_lending", "task-child-2", "Lending"),
        ] {
            handler
                .handle_event(&StreamEvent::tool_call("c", tool, json!({})))
                .unwrap();
            handler
                .handle_event(&StreamEvent::tool_result("c", tool, dispatch_result(child, name)))
                .unwrap();
        }

        let references: Vec<Vec<String>> = bus
            .events()
            .iter()
            .filter_map(|event| match event {
                TaskEvent::StatusUpdate { status, .. } => status
                    .message
                    .as_ref()
                    .map(|message| message.reference_task_ids.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(
            references,
            vec![
                vec!["task-child-1".to_string()],
                vec!["task-child-2".to_string()]
            ]
        );
    }

    #[test]
    fn dispatch_status_carries_workflow_metadata_and_text() {
        let (mut handler, bus) = handler();
        handler
            .handle_event(&StreamEvent::tool_call("c", "dispatch_workflow_trading", json!({})))
            .unwrap();
        handler
            .handle_event(&StreamEvent::tool_result(
                "c",
                "dispatch_workflow_trading",
                dispatch_result("task-child-1", "Trading"),
            ))
            .unwrap();

        let status = bus
            .events()
            .iter()
            .find_map(|event| match event {
                TaskEvent::StatusUpdate {
                    status, metadata, ..
                } => Some((status.clone(), metadata.clone())),
                _ => None,
            })
            .expect("status update");

        assert_eq!(status.0.state, TaskState::Working);
        let message = status.0.message.expect("message");
        assert!(message.text().contains("Dispatching workflow: Trading"));
        let metadata = status.1.expect("metadata");
        assert_eq!(metadata["referencedWorkflow"]["pluginId"], "trading");
    }

    // ── Delta counters ─────────────────────────────────────────────────────

    #[test]
    fn tool_input_end_resets_delta_counter() {
        let (mut handler, _bus) = handler();
        handler
            .handle_event(&StreamEvent::ToolInputDelta {
                delta: Some("{\"q\"".to_string()),
            })
            .unwrap();
        handler
            .handle_event(&StreamEvent::ToolInputDelta {
                delta: Some(":1}".to_string()),
            })
            .unwrap();
        assert_eq!(handler.delta_counters["tool-input-delta"], 2);
        handler.handle_event(&StreamEvent::ToolInputEnd).unwrap();
        assert_eq!(handler.delta_counters["tool-input-delta"], 0);
    }
}
