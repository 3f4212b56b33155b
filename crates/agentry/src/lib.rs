//! Core data model for the Agentry runtime.
//!
//! This crate holds everything the runtime and a model provider need to
//! agree on, and nothing else:
//!
//! - Chat-side types: roles, message content, tool descriptors
//! - The typed event stream a provider yields while generating
//! - The `StreamingChatProvider` seam the runtime consumes
//! - Error types for the provider boundary
//!
//! The A2A wire model and the execution core live in `agentry-agent`.

/// Chat messages, roles, and tool descriptors
pub mod chat;

/// Error types for the provider boundary
pub mod error;

/// The provider seam: a streaming chat interface yielding typed events
pub mod provider;

/// Typed deltas yielded by a provider while generating
pub mod stream;

pub use chat::{ChatMessage, ChatRole, ContentPart, FunctionTool, Tool};
pub use error::LlmError;
pub use provider::{ChatOptions, ChatRequest, EventStream, StreamingChatProvider};
pub use stream::StreamEvent;
