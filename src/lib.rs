pub mod core;

/// Current crate version string exposed for callers and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::workflow::{
    handler_fn, Context, Engine, ExclusiveGateway, ParallelGateway, ServiceHandler, Span,
    SpanStatus, Task, VarMap, Workflow, WorkflowFailure,
};
pub use crate::core::{EngineError, ErrorCategory, ErrorSeverity};
