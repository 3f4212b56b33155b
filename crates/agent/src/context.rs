//! Conversation context store.
//!
//! Process-lifetime keyed store of conversation contexts: ordered
//! history, associated task ids, metadata, and activity tracking.
//! Contexts are created on first successful turn (or explicitly),
//! mutated only by the handlers, and destroyed only by an explicit
//! delete or process exit. There is no cross-process durability by
//! design.

use crate::error::{AgentError, AgentResult};
use agentry::{ChatMessage, ChatRole};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

const CONTEXT_EVENT_BUFFER: usize = 256;

/// One history entry: a message plus when it was appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message: ChatMessage,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// A conversation scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub context_id: String,
    pub history: Vec<HistoryEntry>,
    pub task_ids: Vec<String>,
    pub metadata: Map<String, Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

impl Context {
    fn new(context_id: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            context_id,
            history: Vec::new(),
            task_ids: Vec::new(),
            metadata: Map::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Lifecycle notifications emitted by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContextEvent {
    ContextCreated { context_id: String },
    ContextUpdated { context_id: String },
    ContextDeleted { context_id: String },
}

/// Process-wide context store.
pub struct ContextManager {
    contexts: RwLock<HashMap<String, Context>>,
    saved: RwLock<HashMap<String, Context>>,
    events: broadcast::Sender<ContextEvent>,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CONTEXT_EVENT_BUFFER);
        Self {
            contexts: RwLock::new(HashMap::new()),
            saved: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to context lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    /// Create a context, or reattach to an existing one.
    ///
    /// Without an id a fresh context is created. An id that names a live
    /// context reattaches (refreshing `last_activity`). An unknown id
    /// fails: clients may not mint their own context ids.
    pub fn create_context(&self, context_id: Option<&str>) -> AgentResult<Context> {
        match context_id {
            None => {
                let context = Context::new(format!("ctx-{}", Uuid::now_v7()));
                self.contexts
                    .write()
                    .insert(context.context_id.clone(), context.clone());
                log::info!("context created: {}", context.context_id);
                let _ = self.events.send(ContextEvent::ContextCreated {
                    context_id: context.context_id.clone(),
                });
                Ok(context)
            }
            Some(id) => {
                let mut contexts = self.contexts.write();
                match contexts.get_mut(id) {
                    Some(context) => {
                        context.last_activity = OffsetDateTime::now_utc();
                        log::debug!("context reattached: {id}");
                        Ok(context.clone())
                    }
                    None => Err(AgentError::ContextNotFound {
                        context_id: id.to_string(),
                        hint: "omit contextId to create a new context".to_string(),
                    }),
                }
            }
        }
    }

    /// Return the named context, or create a fresh one when no id is given.
    /// An unknown supplied id still fails.
    pub fn get_or_create_context(&self, context_id: Option<&str>) -> AgentResult<Context> {
        match context_id {
            None => self.create_context(None),
            Some(id) => {
                if let Some(context) = self.contexts.read().get(id) {
                    return Ok(context.clone());
                }
                Err(AgentError::ContextNotFound {
                    context_id: id.to_string(),
                    hint: "omit contextId to create a new context".to_string(),
                })
            }
        }
    }

    /// Look up a context. Never fails.
    pub fn get_context(&self, context_id: &str) -> Option<Context> {
        self.contexts.read().get(context_id).cloned()
    }

    pub fn list_contexts(&self) -> Vec<Context> {
        self.contexts.read().values().cloned().collect()
    }

    /// Associate a task with a context.
    pub fn add_task(&self, context_id: &str, task_id: &str) -> AgentResult<()> {
        self.mutate(context_id, |context| {
            if !context.task_ids.iter().any(|id| id == task_id) {
                context.task_ids.push(task_id.to_string());
            }
        })
    }

    pub fn get_tasks(&self, context_id: &str) -> Vec<String> {
        self.contexts
            .read()
            .get(context_id)
            .map(|context| context.task_ids.clone())
            .unwrap_or_default()
    }

    /// Append one entry to a context's history.
    pub fn add_to_history(&self, context_id: &str, message: ChatMessage) -> AgentResult<()> {
        self.mutate(context_id, |context| {
            context.history.push(HistoryEntry {
                message,
                timestamp: OffsetDateTime::now_utc(),
            });
        })
    }

    /// History as chat messages, oldest first. Unknown contexts yield an
    /// empty history rather than an error: the AI handler must be able to
    /// start a stream without a context existing yet.
    pub fn get_history(&self, context_id: &str) -> Vec<ChatMessage> {
        self.contexts
            .read()
            .get(context_id)
            .map(|context| {
                context
                    .history
                    .iter()
                    .map(|entry| entry.message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge metadata keys into a context.
    pub fn update_context_state(
        &self,
        context_id: &str,
        metadata: Map<String, Value>,
    ) -> AgentResult<()> {
        self.mutate(context_id, |context| {
            for (key, value) in metadata {
                context.metadata.insert(key, value);
            }
        })
    }

    pub fn get_metadata(&self, context_id: &str) -> Map<String, Value> {
        self.contexts
            .read()
            .get(context_id)
            .map(|context| context.metadata.clone())
            .unwrap_or_default()
    }

    /// Refresh a context's `last_activity` without emitting an update.
    pub fn update_activity(&self, context_id: &str) -> AgentResult<()> {
        let mut contexts = self.contexts.write();
        let context = contexts
            .get_mut(context_id)
            .ok_or_else(|| self.not_found(context_id))?;
        context.last_activity = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Whether a context exists and saw activity within the window.
    pub fn is_context_active(&self, context_id: &str, timeout_minutes: i64) -> bool {
        let contexts = self.contexts.read();
        let Some(context) = contexts.get(context_id) else {
            return false;
        };
        let cutoff = OffsetDateTime::now_utc() - time::Duration::minutes(timeout_minutes);
        context.last_activity >= cutoff
    }

    /// In-memory persistence stub: snapshot a context by id.
    pub fn save_context(&self, context_id: &str) -> AgentResult<()> {
        let context = self
            .get_context(context_id)
            .ok_or_else(|| self.not_found(context_id))?;
        self.saved.write().insert(context_id.to_string(), context);
        Ok(())
    }

    /// In-memory persistence stub: restore a previously saved context.
    pub fn load_context(&self, context_id: &str) -> AgentResult<Context> {
        let saved = self
            .saved
            .read()
            .get(context_id)
            .cloned()
            .ok_or_else(|| self.not_found(context_id))?;
        self.contexts
            .write()
            .insert(context_id.to_string(), saved.clone());
        Ok(saved)
    }

    /// Delete a context. The id can never be reattached afterwards.
    pub fn delete_context(&self, context_id: &str) -> AgentResult<()> {
        let removed = self.contexts.write().remove(context_id);
        match removed {
            Some(_) => {
                log::info!("context deleted: {context_id}");
                let _ = self.events.send(ContextEvent::ContextDeleted {
                    context_id: context_id.to_string(),
                });
                Ok(())
            }
            None => Err(self.not_found(context_id)),
        }
    }

    /// Remove contexts whose `last_activity` is older than the cutoff.
    ///
    /// Manual operation only. Nothing in the runtime schedules this:
    /// A2A clients may reattach to a context at any point during the
    /// agent's uptime, so automatic expiry is disabled.
    pub fn cleanup_inactive(&self, timeout_minutes: i64) -> Vec<String> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::minutes(timeout_minutes);
        let mut contexts = self.contexts.write();
        let stale: Vec<String> = contexts
            .iter()
            .filter(|(_, context)| context.last_activity < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            contexts.remove(id);
            let _ = self.events.send(ContextEvent::ContextDeleted {
                context_id: id.clone(),
            });
        }
        stale
    }

    fn mutate(
        &self,
        context_id: &str,
        mutation: impl FnOnce(&mut Context),
    ) -> AgentResult<()> {
        {
            let mut contexts = self.contexts.write();
            let context = contexts
                .get_mut(context_id)
                .ok_or_else(|| self.not_found(context_id))?;
            mutation(context);
            context.last_activity = OffsetDateTime::now_utc();
        }
        let _ = self.events.send(ContextEvent::ContextUpdated {
            context_id: context_id.to_string(),
        });
        Ok(())
    }

    fn not_found(&self, context_id: &str) -> AgentError {
        AgentError::ContextNotFound {
            context_id: context_id.to_string(),
            hint: "omit contextId to create a new context".to_string(),
        }
    }
}

/// Convenience: a user history entry from plain text.
pub fn user_entry(text: impl Into<String>) -> ChatMessage {
    ChatMessage::user().text(text).build()
}

/// Convenience: whether a message was authored by the assistant.
pub fn is_assistant(message: &ChatMessage) -> bool {
    message.role == ChatRole::Assistant
}
