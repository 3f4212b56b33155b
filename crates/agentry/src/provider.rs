use crate::chat::{ChatMessage, Tool};
use crate::error::LlmError;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// The event sequence a provider yields for one turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// One inbound turn handed to a provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The new user message
    pub message: String,
    /// Conversation scope the turn belongs to
    pub context_id: String,
    /// Prior conversation history, oldest first
    pub history: Vec<ChatMessage>,
}

/// Per-turn options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Tools available to the model this turn
    pub tools: Vec<Tool>,
    /// System prompt override, if any
    pub system_prompt: Option<String>,
}

/// The seam between the runtime and a model provider.
///
/// The runtime never talks to a model API directly; it consumes the typed
/// event stream this trait returns and turns it into A2A task events.
/// Anything that can yield [`StreamEvent`]s works: a hosted model, a local
/// one, or a scripted stream in tests.
#[async_trait]
pub trait StreamingChatProvider: Send + Sync {
    /// Start one streaming turn.
    ///
    /// Errors returned here surface before any task event is published;
    /// errors yielded *inside* the stream are converted to a terminal
    /// `failed` status by the stream processor.
    async fn stream_message(
        &self,
        request: ChatRequest,
        options: ChatOptions,
    ) -> Result<EventStream, LlmError>;
}
