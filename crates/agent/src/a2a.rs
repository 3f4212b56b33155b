//! A2A wire model.
//!
//! Everything in this module serializes to the camelCase JSON the A2A
//! protocol puts on the wire: parts, messages, artifacts, task status,
//! the three task event kinds, the agent card, and the JSON-RPC 2.0
//! envelope that carries them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
}

impl TaskState {
    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
        )
    }

    /// A paused task has a suspended workflow awaiting a resume value.
    pub fn is_paused(&self) -> bool {
        matches!(self, TaskState::InputRequired | TaskState::AuthRequired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::AuthRequired => "auth-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            TaskState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk of message or artifact content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    Data {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Part::Data {
            data,
            metadata: None,
        }
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        match self {
            Part::Text { metadata, .. } | Part::Data { metadata, .. } => metadata.as_ref(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Option<Map<String, Value>> {
        match self {
            Part::Text { metadata, .. } | Part::Data { metadata, .. } => metadata,
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

/// An A2A message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Tasks this message refers to (e.g. a freshly dispatched workflow).
    /// Carries only the task the message is about, never an accumulation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_task_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    /// Agent-authored message with a single text part.
    pub fn agent_text(text: impl Into<String>) -> Self {
        Message {
            role: MessageRole::Agent,
            parts: vec![Part::text(text)],
            message_id: None,
            task_id: None,
            context_id: None,
            reference_task_ids: Vec::new(),
            metadata: None,
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text, .. } => Some(text.as_str()),
                Part::Data { .. } => None,
            })
            .collect()
    }
}

/// A named, chunkable payload attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Current status of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        TaskStatus {
            state,
            message: None,
            timestamp: None,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(OffsetDateTime::now_utc());
        self
    }
}

/// A task record as returned by `tasks/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    pub kind: String,
}

/// The three A2A task event kinds published on a task's event bus and
/// streamed to SSE subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskEvent {
    /// Initial event announcing a task.
    #[serde(rename_all = "camelCase")]
    Task {
        id: String,
        context_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        artifacts: Vec<Artifact>,
    },
    /// A state transition. `final: true` marks the last event of a task.
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        task_id: String,
        context_id: String,
        status: TaskStatus,
        #[serde(rename = "final")]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    /// One chunk of an artifact.
    #[serde(rename_all = "camelCase")]
    ArtifactUpdate {
        task_id: String,
        context_id: String,
        artifact: Artifact,
        #[serde(default)]
        append: bool,
        #[serde(default)]
        last_chunk: bool,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Task { id, .. } => id,
            TaskEvent::StatusUpdate { task_id, .. } | TaskEvent::ArtifactUpdate { task_id, .. } => {
                task_id
            }
        }
    }

    pub fn context_id(&self) -> &str {
        match self {
            TaskEvent::Task { context_id, .. }
            | TaskEvent::StatusUpdate { context_id, .. }
            | TaskEvent::ArtifactUpdate { context_id, .. } => context_id,
        }
    }

    /// True only for the terminal status-update of a task.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TaskEvent::StatusUpdate { is_final: true, .. }
        )
    }
}

// ── Agent discovery ────────────────────────────────────────────────────────

/// Capabilities advertised in the agent card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<AgentExtension>,
}

/// A declared protocol extension (e.g. `urn:agent:tool-policies`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExtension {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A skill listed in the agent card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkillRef {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// The discovery document served at `/.well-known/agent.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub protocol_version: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub capabilities: AgentCapabilities,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub skills: Vec<AgentSkillRef>,
}

// ── JSON-RPC 2.0 envelope ──────────────────────────────────────────────────

pub mod rpc {
    //! JSON-RPC 2.0 envelope and the A2A error codes.

    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Request {
        pub jsonrpc: String,
        #[serde(default)]
        pub id: Option<Value>,
        pub method: String,
        #[serde(default)]
        pub params: Value,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ErrorObject {
        pub code: i64,
        pub message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub data: Option<Value>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Response {
        pub jsonrpc: String,
        #[serde(default)]
        pub id: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<ErrorObject>,
    }

    impl Response {
        pub fn success(id: Option<Value>, result: Value) -> Self {
            Response {
                jsonrpc: "2.0".to_string(),
                id,
                result: Some(result),
                error: None,
            }
        }

        pub fn failure(id: Option<Value>, error: ErrorObject) -> Self {
            Response {
                jsonrpc: "2.0".to_string(),
                id,
                result: None,
                error: Some(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── TaskState ──────────────────────────────────────────────────────────

    #[test]
    fn terminal_states_are_exactly_four() {
        let terminal = [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::Rejected,
        ];
        for state in terminal {
            assert!(state.is_terminal(), "{state} should be terminal");
        }
        for state in [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::AuthRequired,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn paused_states_are_the_input_states() {
        assert!(TaskState::InputRequired.is_paused());
        assert!(TaskState::AuthRequired.is_paused());
        assert!(!TaskState::Working.is_paused());
        assert!(!TaskState::Completed.is_paused());
    }

    #[test]
    fn task_state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TaskState::InputRequired).unwrap(),
            r#""input-required""#
        );
        assert_eq!(
            serde_json::to_string(&TaskState::AuthRequired).unwrap(),
            r#""auth-required""#
        );
    }

    // ── Parts and messages ─────────────────────────────────────────────────

    #[test]
    fn text_part_is_kind_tagged() {
        let part = Part::text("hello");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json, json!({"kind": "text", "text": "hello"}));
    }

    #[test]
    fn data_part_round_trips() {
        let part = Part::data(json!({"answer": 42}));
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["kind"], "data");
        let back: Part = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let message = Message {
            role: MessageRole::Agent,
            parts: vec![
                Part::text("Hello"),
                Part::data(json!({"x": 1})),
                Part::text(" world"),
            ],
            message_id: None,
            task_id: None,
            context_id: None,
            reference_task_ids: Vec::new(),
            metadata: None,
        };
        assert_eq!(message.text(), "Hello world");
    }

    #[test]
    fn message_wire_shape_is_camel_case() {
        let mut message = Message::agent_text("dispatched");
        message.reference_task_ids = vec!["task-child-1".to_string()];
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "agent");
        assert_eq!(json["referenceTaskIds"], json!(["task-child-1"]));
        assert!(json.get("messageId").is_none());
    }

    // ── Task events ────────────────────────────────────────────────────────

    #[test]
    fn status_update_wire_shape() {
        let event = TaskEvent::StatusUpdate {
            task_id: "t1".to_string(),
            context_id: "ctx-1".to_string(),
            status: TaskStatus::new(TaskState::Completed),
            is_final: true,
            metadata: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "status-update");
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["contextId"], "ctx-1");
        assert_eq!(json["final"], true);
        assert_eq!(json["status"]["state"], "completed");
    }

    #[test]
    fn artifact_update_wire_shape() {
        let event = TaskEvent::ArtifactUpdate {
            task_id: "t1".to_string(),
            context_id: "ctx-1".to_string(),
            artifact: Artifact {
                artifact_id: "text-response-t1".to_string(),
                name: None,
                description: None,
                parts: vec![Part::text("chunk")],
                metadata: None,
            },
            append: true,
            last_chunk: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "artifact-update");
        assert_eq!(json["artifact"]["artifactId"], "text-response-t1");
        assert_eq!(json["append"], true);
        assert_eq!(json["lastChunk"], false);
    }

    #[test]
    fn is_final_only_for_final_status_updates() {
        let task = TaskEvent::Task {
            id: "t1".to_string(),
            context_id: "ctx".to_string(),
            status: TaskStatus::new(TaskState::Submitted),
            artifacts: Vec::new(),
        };
        assert!(!task.is_final());

        let nonfinal = TaskEvent::StatusUpdate {
            task_id: "t1".to_string(),
            context_id: "ctx".to_string(),
            status: TaskStatus::new(TaskState::Working),
            is_final: false,
            metadata: None,
        };
        assert!(!nonfinal.is_final());

        let terminal = TaskEvent::StatusUpdate {
            task_id: "t1".to_string(),
            context_id: "ctx".to_string(),
            status: TaskStatus::new(TaskState::Failed),
            is_final: true,
            metadata: None,
        };
        assert!(terminal.is_final());
    }

    #[test]
    fn event_accessors_echo_ids() {
        let event = TaskEvent::Task {
            id: "t9".to_string(),
            context_id: "ctx-9".to_string(),
            status: TaskStatus::new(TaskState::Submitted),
            artifacts: Vec::new(),
        };
        assert_eq!(event.task_id(), "t9");
        assert_eq!(event.context_id(), "ctx-9");
    }

    // ── JSON-RPC envelope ──────────────────────────────────────────────────

    #[test]
    fn rpc_success_shape() {
        let response = rpc::Response::success(Some(json!(1)), json!({"ok": true}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["result"]["ok"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn rpc_failure_shape() {
        let response = rpc::Response::failure(
            None,
            rpc::ErrorObject {
                code: rpc::METHOD_NOT_FOUND,
                message: "unknown method".to_string(),
                data: None,
            },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn rpc_request_parses_with_defaulted_params() {
        let request: rpc::Request =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "tasks/get"}))
                .unwrap();
        assert_eq!(request.method, "tasks/get");
        assert!(request.params.is_null());
    }
}
