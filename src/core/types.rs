use serde::{Deserialize, Serialize};

/// Error categories surfaced by the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Requested workflow name is not registered.
    WorkflowNotFound,
    /// A service task referenced an unknown handler name at registration time.
    HandlerNotRegistered,
    /// An exclusive gateway's conditions all evaluated false and no default exists.
    NoMatchingBranch,
    /// A service task's handler failed or timed out.
    TaskExecutionError,
    /// A parallel gateway branch failed.
    BranchExecutionError,
    ValidationError,
    SerializationError,
    IoError,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Severity attached to engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
