//! Artifact event constructors.
//!
//! Three shapes leave the runtime on the wire: streaming text chunks
//! (one logical artifact per stream, assembled client-side from chunks),
//! tool-call descriptors, and tool-result payloads. Workflow dispatch
//! results get their parts normalized so every part carries the child
//! task's id and the dispatch metadata.

use crate::a2a::{Artifact, Part, TaskEvent};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Which logical text stream an artifact chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextArtifactKind {
    /// Model output text
    TextResponse,
    /// Model reasoning
    Reasoning,
}

impl TextArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextArtifactKind::TextResponse => "text-response",
            TextArtifactKind::Reasoning => "reasoning",
        }
    }
}

/// The synchronous result a workflow dispatch hands back to the model.
///
/// Structurally: `{ taskId, metadata, result: [parts] }`. Tool results
/// matching this shape get the workflow normalization in
/// [`tool_result_artifact`].
#[derive(Debug, Clone)]
pub struct WorkflowDispatchResponse {
    pub task_id: String,
    pub metadata: Map<String, Value>,
    pub result: Vec<Part>,
}

impl WorkflowDispatchResponse {
    /// Detect the dispatch-response shape in an arbitrary tool result.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let task_id = obj.get("taskId")?.as_str()?.to_string();
        let metadata = obj.get("metadata")?.as_object()?.clone();
        let result = obj.get("result")?.as_array()?;
        let parts = result
            .iter()
            .map(|part| serde_json::from_value::<Part>(part.clone()))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        Some(WorkflowDispatchResponse {
            task_id,
            metadata,
            result: parts,
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "taskId": self.task_id,
            "metadata": Value::Object(self.metadata.clone()),
            "result": self.result,
        })
    }
}

/// Build one chunk of a streaming text artifact.
///
/// The artifact id is stable per logical stream (`"{kind}-{task_id}"`),
/// `append` is true for every chunk after the first, and `last_chunk` is
/// set by the caller when the stream ends.
pub fn streaming_text_artifact(
    task_id: &str,
    context_id: &str,
    kind: TextArtifactKind,
    content: impl Into<String>,
    chunk_index: usize,
    is_last_chunk: bool,
) -> TaskEvent {
    TaskEvent::ArtifactUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        artifact: Artifact {
            artifact_id: format!("{}-{}", kind.as_str(), task_id),
            name: Some(kind.as_str().to_string()),
            description: None,
            parts: vec![Part::text(content.into())],
            metadata: None,
        },
        append: chunk_index > 0,
        last_chunk: is_last_chunk,
    }
}

/// Build the artifact announcing a tool invocation.
///
/// Returns the generated artifact id alongside the event so the result
/// artifact can later replace this one's payload.
pub fn tool_call_artifact(
    task_id: &str,
    context_id: &str,
    tool_name: &str,
    input: &Value,
) -> (String, TaskEvent) {
    let artifact_id = format!("tool-call-{}-{}", tool_name, Uuid::new_v4());
    let event = TaskEvent::ArtifactUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        artifact: Artifact {
            artifact_id: artifact_id.clone(),
            name: Some(tool_name.to_string()),
            description: Some(format!("Tool call: {tool_name}")),
            parts: vec![Part::data(input.clone())],
            metadata: None,
        },
        append: false,
        last_chunk: false,
    };
    (artifact_id, event)
}

/// Build the artifact carrying a tool's result, replacing the call's
/// payload under the same artifact id.
///
/// A result that is structurally a workflow dispatch response has its
/// parts normalized instead: each child part is cloned, the dispatch
/// metadata is merged non-destructively, and the child task id is
/// stamped on every part.
pub fn tool_result_artifact(
    task_id: &str,
    context_id: &str,
    artifact_id: &str,
    tool_name: &str,
    output: &Value,
) -> TaskEvent {
    let parts = match WorkflowDispatchResponse::from_value(output) {
        Some(response) => normalize_dispatch_parts(&response),
        None => vec![Part::data(output.clone())],
    };
    TaskEvent::ArtifactUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        artifact: Artifact {
            artifact_id: artifact_id.to_string(),
            name: Some(tool_name.to_string()),
            description: Some(format!("Tool result: {tool_name}")),
            parts,
            metadata: None,
        },
        append: false,
        last_chunk: true,
    }
}

fn normalize_dispatch_parts(response: &WorkflowDispatchResponse) -> Vec<Part> {
    response
        .result
        .iter()
        .map(|part| {
            let mut part = part.clone();
            let metadata = part.metadata_mut().get_or_insert_with(Map::new);
            for (key, value) in &response.metadata {
                metadata.entry(key.clone()).or_insert_with(|| value.clone());
            }
            metadata.insert("taskId".to_string(), Value::String(response.task_id.clone()));
            part
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Streaming text artifacts ───────────────────────────────────────────

    #[test]
    fn first_chunk_has_stable_id_and_no_append() {
        let event = streaming_text_artifact(
            "t1",
            "ctx-1",
            TextArtifactKind::TextResponse,
            "Hello",
            0,
            false,
        );
        match event {
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
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn later_chunks_append_under_the_same_id() {
        let event =
            streaming_text_artifact("t1", "ctx-1", TextArtifactKind::Reasoning, "more", 3, true);
        match event {
            TaskEvent::ArtifactUpdate {
                artifact,
                append,
                last_chunk,
                ..
            } => {
                assert_eq!(artifact.artifact_id, "reasoning-t1");
                assert!(append);
                assert!(last_chunk);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // ── Tool-call artifacts ────────────────────────────────────────────────

    #[test]
    fn tool_call_artifact_ids_are_fresh_per_call() {
        let input = json!({"q": "rust"});
        let (id_a, _) = tool_call_artifact("t1", "ctx-1", "search", &input);
        let (id_b, _) = tool_call_artifact("t1", "ctx-1", "search", &input);
        assert!(id_a.starts_with("tool-call-search-"));
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn tool_call_artifact_carries_input_as_data_part() {
        let input = json!({"symbol": "ETH"});
        let (_, event) = tool_call_artifact("t1", "ctx-1", "price", &input);
        match event {
            TaskEvent::ArtifactUpdate {
                artifact,
                last_chunk,
                ..
            } => {
                assert!(!last_chunk);
                assert_eq!(artifact.parts, vec![Part::data(input)]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // ── Tool-result artifacts ──────────────────────────────────────────────

    #[test]
    fn plain_result_replaces_payload_with_last_chunk() {
        let output = json!({"price": 1234.5});
        let event = tool_result_artifact("t1", "ctx-1", "tool-call-price-abc", "price", &output);
        match event {
            TaskEvent::ArtifactUpdate {
                artifact,
                last_chunk,
                append,
                ..
            } => {
                assert_eq!(artifact.artifact_id, "tool-call-price-abc");
                assert!(last_chunk);
                assert!(!append);
                assert_eq!(artifact.parts, vec![Part::data(output)]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dispatch_response_parts_get_task_id_stamped() {
        let output = json!({
            "taskId": "task-child-1",
            "metadata": {"workflowName": "Trading", "pluginId": "trading"},
            "result": [
                {"kind": "text", "text": "order placed"},
                {"kind": "data", "data": {"orderId": 7}, "metadata": {"workflowName": "keep-me"}}
            ]
        });
        let event = tool_result_artifact(
            "t1",
            "ctx-1",
            "tool-call-dispatch_workflow_trading-x",
            "dispatch_workflow_trading",
            &output,
        );
        let TaskEvent::ArtifactUpdate { artifact, .. } = event else {
            panic!("unexpected event kind");
        };
        assert_eq!(artifact.parts.len(), 2);

        let first_meta = artifact.parts[0].metadata().expect("metadata");
        assert_eq!(first_meta["taskId"], "task-child-1");
        assert_eq!(first_meta["workflowName"], "Trading");

        // Merge is non-destructive: existing keys win, taskId is stamped.
        let second_meta = artifact.parts[1].metadata().expect("metadata");
        assert_eq!(second_meta["workflowName"], "keep-me");
        assert_eq!(second_meta["taskId"], "task-child-1");
    }

    #[test]
    fn dispatch_detection_requires_all_three_fields() {
        assert!(WorkflowDispatchResponse::from_value(&json!({"taskId": "t"})).is_none());
        assert!(
            WorkflowDispatchResponse::from_value(&json!({
                "taskId": "t", "metadata": {}, "result": "not-an-array"
            }))
            .is_none()
        );
        assert!(
            WorkflowDispatchResponse::from_value(&json!({
                "taskId": "t", "metadata": {}, "result": []
            }))
            .is_some()
        );
    }

    #[test]
    fn dispatch_response_value_round_trips() {
        let response = WorkflowDispatchResponse {
            task_id: "task-child-2".to_string(),
            metadata: Map::new(),
            result: vec![Part::text("done")],
        };
        let back = WorkflowDispatchResponse::from_value(&response.to_value()).expect("round trip");
        assert_eq!(back.task_id, "task-child-2");
        assert_eq!(back.result, vec![Part::text("done")]);
    }
}
