use crate::core::error::EngineError;
use crate::core::workflow::context::{Context, VarMap};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Trait implemented by service task handlers.
///
/// Handlers read the run context and return partial variable updates to be
/// shallow-merged into it. Under `continue_on_error` a handler should
/// report expected failures in its returned mapping instead of erroring;
/// an `Err` aborts the workflow under the default policy.
#[async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    async fn call(&self, ctx: &Context) -> Result<VarMap, EngineError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ServiceHandler for FnHandler<F>
where
    F: Fn(VarMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<VarMap, EngineError>> + Send + 'static,
{
    async fn call(&self, ctx: &Context) -> Result<VarMap, EngineError> {
        (self.f)(ctx.variables.clone()).await
    }
}

/// Wrap a plain async closure over a variables snapshot into a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ServiceHandler>
where
    F: Fn(VarMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<VarMap, EngineError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Condition evaluated by an exclusive gateway against the run context.
pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Workflow step invoking a caller-supplied handler.
pub struct ServiceTask {
    pub id: String,
    pub name: String,
    pub handler: Arc<dyn ServiceHandler>,
    /// Optional per-task execution deadline.
    pub timeout: Option<Duration>,
}

/// Fan-out/fan-in construct: runs each branch's task list concurrently on a
/// forked context, then merges results back in registration order
/// (last branch wins on key collision).
pub struct ParallelGateway {
    pub id: String,
    pub name: String,
    pub branches: Vec<Vec<Task>>,
}

/// Conditional construct: evaluates conditions in insertion order and
/// executes exactly one matching branch on the unforked parent context.
pub struct ExclusiveGateway {
    pub id: String,
    pub name: String,
    pub conditions: IndexMap<String, Predicate>,
    pub paths: IndexMap<String, Vec<Task>>,
    /// Branch taken when no condition matches.
    pub default_branch: Option<String>,
}

impl ExclusiveGateway {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ExclusiveGateway {
            id: id.into(),
            name: name.into(),
            conditions: IndexMap::new(),
            paths: IndexMap::new(),
            default_branch: None,
        }
    }

    /// Register a branch with its guarding condition. Registration order
    /// is evaluation order; the first matching condition wins.
    pub fn branch(
        mut self,
        name: impl Into<String>,
        condition: Predicate,
        tasks: Vec<Task>,
    ) -> Self {
        let name = name.into();
        self.conditions.insert(name.clone(), condition);
        self.paths.insert(name, tasks);
        self
    }

    /// Register an unconditional branch reachable only as the default.
    pub fn default_path(mut self, name: impl Into<String>, tasks: Vec<Task>) -> Self {
        let name = name.into();
        self.paths.insert(name.clone(), tasks);
        self.default_branch = Some(name);
        self
    }
}

/// Unit of executable work within a workflow. Variants are selected at
/// registration time; the engine never infers behavior from display names.
pub enum Task {
    Service(ServiceTask),
    Parallel(ParallelGateway),
    Exclusive(ExclusiveGateway),
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl Task {
    pub fn service(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
    ) -> Self {
        Task::Service(ServiceTask {
            id: id.into(),
            name: name.into(),
            handler,
            timeout: None,
        })
    }

    pub fn service_with_timeout(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
        timeout: Duration,
    ) -> Self {
        Task::Service(ServiceTask {
            id: id.into(),
            name: name.into(),
            handler,
            timeout: Some(timeout),
        })
    }

    pub fn parallel(
        id: impl Into<String>,
        name: impl Into<String>,
        branches: Vec<Vec<Task>>,
    ) -> Self {
        Task::Parallel(ParallelGateway {
            id: id.into(),
            name: name.into(),
            branches,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Task::Service(t) => &t.id,
            Task::Parallel(g) => &g.id,
            Task::Exclusive(g) => &g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Service(t) => &t.name,
            Task::Parallel(g) => &g.name,
            Task::Exclusive(g) => &g.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::Service(_) => "service",
            Task::Parallel(_) => "parallel",
            Task::Exclusive(_) => "exclusive",
        }
    }

    /// Span identifier for this task, e.g. `service.LoadSemantics`.
    pub fn span_name(&self) -> String {
        format!("{}.{}", self.kind(), self.id())
    }
}

impl From<ExclusiveGateway> for Task {
    fn from(gateway: ExclusiveGateway) -> Self {
        Task::Exclusive(gateway)
    }
}
