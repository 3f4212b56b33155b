//! One streaming AI turn.

use crate::a2a::{Message, MessageRole, Part, TaskEvent, TaskState, TaskStatus};
use crate::context::ContextManager;
use crate::error::AgentResult;
use crate::event_bus::TaskEventBus;
use crate::stream::{WorkflowDispatcher, process_stream};
use crate::tools::ToolRegistry;
use agentry::{ChatMessage, ChatOptions, ChatRequest, StreamingChatProvider};
use std::sync::Arc;
use tracing::instrument;

pub struct AiHandler {
    contexts: Arc<ContextManager>,
    provider: Arc<dyn StreamingChatProvider>,
    registry: Arc<ToolRegistry>,
    system_prompt: Option<String>,
}

impl AiHandler {
    pub fn new(
        contexts: Arc<ContextManager>,
        provider: Arc<dyn StreamingChatProvider>,
        registry: Arc<ToolRegistry>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            contexts,
            provider,
            registry,
            system_prompt,
        }
    }

    /// Run one streaming turn against the model and persist history on
    /// success.
    ///
    /// An unknown context never fails here: the turn proceeds with an
    /// empty history, and since the context does not exist afterwards
    /// either, nothing is persisted. For a known context, history grows
    /// by exactly two entries (user then assistant) and only after the
    /// terminal status-update is on the bus.
    #[instrument(name = "agent.ai_turn", skip(self, message, bus), fields(context_id = %context_id, task_id = %task_id))]
    pub async fn handle_streaming(
        &self,
        message: &str,
        context_id: &str,
        task_id: &str,
        bus: Arc<TaskEventBus>,
    ) -> AgentResult<Option<ChatMessage>> {
        let history = self.contexts.get_history(context_id);
        let tools = self.registry.definitions();
        log::debug!(
            "ai turn: context={context_id} task={task_id} history={} tools={}",
            history.len(),
            tools.len()
        );

        let request = ChatRequest {
            message: message.to_string(),
            context_id: context_id.to_string(),
            history,
        };
        let options = ChatOptions {
            tools,
            system_prompt: self.system_prompt.clone(),
        };

        let stream = match self.provider.stream_message(request, options).await {
            Ok(stream) => stream,
            Err(error) => {
                // Blast-wall: a provider that refuses to start a stream
                // still yields a terminal status and a finished bus.
                log::warn!("provider refused stream for {task_id}: {error}");
                bus.publish(TaskEvent::StatusUpdate {
                    task_id: task_id.to_string(),
                    context_id: context_id.to_string(),
                    status: TaskStatus {
                        state: TaskState::Failed,
                        message: Some(Message {
                            role: MessageRole::Agent,
                            parts: vec![Part::text(error.to_string())],
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
                bus.finished();
                return Ok(None);
            }
        };

        let dispatcher: Arc<dyn WorkflowDispatcher> = self.registry.clone();
        let assistant =
            process_stream(stream, task_id, context_id, bus, Some(dispatcher)).await;

        if let Some(assistant) = &assistant {
            if self.contexts.get_context(context_id).is_some() {
                self.contexts
                    .add_to_history(context_id, ChatMessage::user().text(message).build())?;
                self.contexts.add_to_history(context_id, assistant.clone())?;
            }
        }
        Ok(assistant)
    }
}
