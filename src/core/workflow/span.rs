use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of a single task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of one task execution.
///
/// This is a plain record, not a live tracing span: it is stamped once at
/// close and never mutated after being appended to the context's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span identifier, e.g. `service.LoadSemantics`.
    pub name: String,
    /// RFC3339 wall-clock timestamp taken when the span closed.
    pub timestamp: String,
    /// Free-form attributes describing the execution (duration, error, ...).
    pub attributes: Map<String, Value>,
    /// Id of the task that produced this span.
    pub task: String,
    pub status: SpanStatus,
}

impl Span {
    /// Close a span now, stamping the current wall-clock time.
    pub fn close(
        name: impl Into<String>,
        task: impl Into<String>,
        status: SpanStatus,
        attributes: Map<String, Value>,
    ) -> Self {
        Span {
            name: name.into(),
            timestamp: Utc::now().to_rfc3339(),
            attributes,
            task: task.into(),
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }
}
