pub mod error;
pub mod types;
pub mod workflow;

pub use error::EngineError;
pub use types::{ErrorCategory, ErrorSeverity};
