use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed delta yielded by a provider while generating one turn.
///
/// The payload fields are optional on purpose: events cross a provider
/// boundary and arrive effectively untyped, so every consumer validates
/// what it needs instead of trusting the shape. A delta without text is
/// ignored by the stream handler; a tool call without a name is an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental text content
    TextDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// The text block is complete
    TextEnd,
    /// A reasoning block started
    ReasoningStart,
    /// Incremental reasoning content
    ReasoningDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// The reasoning block is complete
    ReasoningEnd,
    /// The model invoked a tool
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// A tool invocation produced a result
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    /// Partial JSON for a tool call's input
    ToolInputDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
    },
    /// The tool call's input is fully assembled
    ToolInputEnd,
    /// Any event kind this runtime does not interpret
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Short tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::TextEnd => "text-end",
            StreamEvent::ReasoningStart => "reasoning-start",
            StreamEvent::ReasoningDelta { .. } => "reasoning-delta",
            StreamEvent::ReasoningEnd => "reasoning-end",
            StreamEvent::ToolCall { .. } => "tool-call",
            StreamEvent::ToolResult { .. } => "tool-result",
            StreamEvent::ToolInputDelta { .. } => "tool-input-delta",
            StreamEvent::ToolInputEnd => "tool-input-end",
            StreamEvent::Unknown => "unknown",
        }
    }

    /// Convenience constructor for a text delta.
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            text: Some(text.into()),
        }
    }

    /// Convenience constructor for a reasoning delta.
    pub fn reasoning_delta(text: impl Into<String>) -> Self {
        StreamEvent::ReasoningDelta {
            text: Some(text.into()),
        }
    }

    /// Convenience constructor for a complete tool call.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        StreamEvent::ToolCall {
            id: Some(id.into()),
            tool_name: Some(name.into()),
            input: Some(input),
        }
    }

    /// Convenience constructor for a tool result.
    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, output: Value) -> Self {
        StreamEvent::ToolResult {
            id: Some(id.into()),
            tool_name: Some(name.into()),
            output: Some(output),
        }
    }
}
