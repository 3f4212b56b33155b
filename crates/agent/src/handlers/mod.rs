//! Turn-level orchestration.
//!
//! The AI handler runs one streaming model turn; the workflow handler
//! bridges dispatch tools into the workflow runtime and re-emits child
//! events on the parent task's bus; the executor is the single entry
//! point the transport calls for every inbound message.

mod ai;
mod executor;
mod workflow;

pub use ai::AiHandler;
pub use executor::{AgentExecutor, RequestContext, Routed};
pub use workflow::WorkflowHandler;
