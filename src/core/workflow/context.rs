use crate::core::workflow::span::{Span, SpanStatus};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Variable blackboard shared by all tasks within one workflow run.
pub type VarMap = Map<String, Value>;

/// Mutable state of a single workflow run: variables plus the append-only
/// span log. Each run owns its context exclusively; parallel gateway
/// branches operate on forked copies that are merged back after the join.
#[derive(Debug, Clone)]
pub struct Context {
    pub variables: VarMap,
    pub spans: Vec<Span>,
    /// Id of the task presently executing; overwritten on each task entry.
    pub current_task: Option<String>,
    /// Correlates log events from one run.
    pub run_id: Uuid,
    /// Variables written through this context, latest value per key.
    /// Forked branch contexts start empty, so after the join the gateway
    /// folds exactly what each branch wrote, including writes that
    /// restore a key to its pre-fork value.
    pub writes: VarMap,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            variables: VarMap::new(),
            spans: Vec::new(),
            current_task: None,
            run_id: Uuid::new_v4(),
            writes: VarMap::new(),
        }
    }

    pub fn with_variables(variables: VarMap) -> Self {
        Context {
            variables,
            ..Context::new()
        }
    }

    /// Look up a variable. Never fails; missing keys return `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Look up a variable, falling back to `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.variables.get(key).unwrap_or(default)
    }

    /// Overwrite a variable. No type checking; last writer wins.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.writes.insert(key.clone(), value.clone());
        self.variables.insert(key, value);
    }

    /// Shallow-merge partial updates into the blackboard, overwriting on
    /// key collision.
    pub fn merge(&mut self, updates: VarMap) {
        for (key, value) in updates {
            self.writes.insert(key.clone(), value.clone());
            self.variables.insert(key, value);
        }
    }

    /// Append a span attributed to the currently executing task.
    pub fn record_span(
        &mut self,
        name: impl Into<String>,
        status: SpanStatus,
        attributes: VarMap,
    ) {
        let task = self.current_task.clone().unwrap_or_default();
        self.spans.push(Span::close(name, task, status, attributes));
    }

    /// Clone the variables into a branch-local context with empty span
    /// and write buffers. Used by the parallel gateway so no branch can
    /// observe another branch's in-flight mutations.
    pub fn fork(&self) -> Context {
        Context {
            variables: self.variables.clone(),
            spans: Vec::new(),
            current_task: None,
            run_id: self.run_id,
            writes: VarMap::new(),
        }
    }

    /// Append a batch of spans in order.
    pub fn extend_spans(&mut self, spans: Vec<Span>) {
        self.spans.extend(spans);
    }
}
