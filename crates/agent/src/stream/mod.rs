//! Stream event processing.
//!
//! The handler routes individual provider events to the artifact factory
//! and the event bus; the processor drives a whole stream to completion
//! and owns the terminal-status and `finished()` guarantees.

mod handler;
mod processor;

pub use handler::{StreamEventHandler, ToolCallRecord};
pub use processor::{WorkflowDispatcher, process_stream};
