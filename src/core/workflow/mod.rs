//! Workflow orchestration core: tasks, gateways, span tracking, reporting.

pub mod context;
pub mod diagram;
pub mod engine;
pub mod expression;
pub mod report;
pub mod schema;
pub mod span;
pub mod task;

pub use context::{Context, VarMap};
pub use engine::{Engine, Workflow, WorkflowFailure};
pub use span::{Span, SpanStatus};
pub use task::{handler_fn, ExclusiveGateway, ParallelGateway, ServiceHandler, ServiceTask, Task};
