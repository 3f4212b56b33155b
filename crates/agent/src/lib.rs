//! Agentry runtime: the execution core of an A2A agent.
//!
//! Three subsystems do the real work: the stream processor turns provider
//! deltas into well-ordered A2A task events, the workflow runtime drives
//! pausable multi-step procedures with schema-validated resume, and the
//! context manager keeps conversation state for the process lifetime.
//! Around them sit the per-task event bus, the tool registry, the
//! handlers, the config orchestrator, and the axum JSON-RPC/SSE shell.

pub mod a2a;
pub mod api;
pub mod artifacts;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod handlers;
pub mod state;
pub mod stream;
pub mod tools;
pub mod workflow;

pub use builder::AgentBuilder;
pub use error::{AgentError, AgentResult};
