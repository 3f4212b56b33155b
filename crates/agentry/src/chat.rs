use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The user/human participant
    User,
    /// The model participant
    Assistant,
}

/// One block of message content.
///
/// Assembled assistant messages list reasoning blocks before text blocks;
/// some providers reject the reverse order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Model reasoning/thinking content
    Reasoning { text: String },
    /// Plain text content
    Text { text: String },
}

impl ContentPart {
    pub fn text(&self) -> &str {
        match self {
            ContentPart::Reasoning { text } | ContentPart::Text { text } => text,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of who sent this message
    pub role: ChatRole,
    /// Ordered content blocks
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }

    /// Create a new builder for an assistant message
    pub fn assistant() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::Assistant)
    }

    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Reasoning { .. } => None,
            })
            .collect()
    }
}

/// Builder for [`ChatMessage`]
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    content: Vec<ContentPart>,
}

impl ChatMessageBuilder {
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            content: Vec::new(),
        }
    }

    /// Append a text block
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ContentPart::Text { text: text.into() });
        self
    }

    /// Append a reasoning block
    pub fn reasoning(mut self, text: impl Into<String>) -> Self {
        self.content
            .push(ContentPart::Reasoning { text: text.into() });
        self
    }

    pub fn build(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content,
        }
    }
}

/// Function definition backing a tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FunctionTool {
    /// The name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the function's parameters
    pub parameters: Value,
}

/// A tool the model may call during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Tool {
    /// The type of tool (always "function" today)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// The function definition
    pub function: FunctionTool,
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}
