use crate::core::error::EngineError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::context::{Context, VarMap};
use crate::core::workflow::span::SpanStatus;
use crate::core::workflow::task::{
    ExclusiveGateway, ParallelGateway, ServiceHandler, ServiceTask, Task,
};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

/// Named, ordered task list plus its failure policy.
pub struct Workflow {
    pub name: String,
    pub tasks: Vec<Task>,
    /// When true, task and branch failures are recorded as ERROR spans and
    /// the run continues. When false (default) the run aborts on the first
    /// failure.
    pub continue_on_error: bool,
}

/// Failed workflow run. Carries the partial context so callers can render
/// the span log of an aborted run for diagnosis.
#[derive(Debug)]
pub struct WorkflowFailure {
    pub error: EngineError,
    pub context: Context,
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "workflow run {} failed: {}",
            self.context.run_id, self.error
        )
    }
}

impl std::error::Error for WorkflowFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Owns the read-only registries of named workflows and service handlers.
///
/// Registries are populated at startup and never mutated during execution,
/// so one engine may serve concurrent `execute_workflow` calls; every run
/// gets its own [`Context`].
#[derive(Default)]
pub struct Engine {
    workflows: HashMap<String, Workflow>,
    service_handlers: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn register_service_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
    ) {
        self.service_handlers.insert(name.into(), handler);
    }

    /// Look up a registered handler by name.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.service_handlers.get(name).cloned()
    }

    /// Build a service task from a registered handler name. Unknown names
    /// fail here, at registration time, not at run time.
    pub fn create_service_task(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        handler_name: &str,
    ) -> Result<Task, EngineError> {
        let handler = self.handler(handler_name).ok_or_else(|| {
            EngineError::new(
                ErrorCategory::HandlerNotRegistered,
                format!("service handler '{}' is not registered", handler_name),
            )
            .with_code("WG-ENG-002")
        })?;
        Ok(Task::service(id, name, handler))
    }

    pub fn register_workflow(&mut self, name: impl Into<String>, tasks: Vec<Task>) {
        self.register_workflow_with_policy(name, tasks, false);
    }

    pub fn register_workflow_with_policy(
        &mut self,
        name: impl Into<String>,
        tasks: Vec<Task>,
        continue_on_error: bool,
    ) {
        let name = name.into();
        self.workflows.insert(
            name.clone(),
            Workflow {
                name,
                tasks,
                continue_on_error,
            },
        );
    }

    /// Execute a registered workflow against a fresh context seeded with
    /// `initial` variables. Returns the final context (variables plus the
    /// full span log); on abort the partial context travels inside the
    /// failure.
    pub async fn execute_workflow(
        &self,
        name: &str,
        initial: Option<VarMap>,
    ) -> Result<Context, WorkflowFailure> {
        let mut ctx = match initial {
            Some(variables) => Context::with_variables(variables),
            None => Context::new(),
        };
        let workflow = match self.workflows.get(name) {
            Some(workflow) => workflow,
            None => {
                return Err(WorkflowFailure {
                    error: EngineError::new(
                        ErrorCategory::WorkflowNotFound,
                        format!("workflow '{}' is not registered", name),
                    )
                    .with_code("WG-ENG-001"),
                    context: ctx,
                });
            }
        };

        tracing::info!(
            workflow = %name,
            run_id = %ctx.run_id,
            tasks = workflow.tasks.len(),
            continue_on_error = workflow.continue_on_error,
            "starting workflow run"
        );
        for task in &workflow.tasks {
            if let Err(error) = run_task(task, &mut ctx, workflow.continue_on_error).await {
                tracing::warn!(
                    workflow = %name,
                    run_id = %ctx.run_id,
                    task = task.id(),
                    error = %error,
                    "workflow run aborted"
                );
                return Err(WorkflowFailure {
                    error,
                    context: ctx,
                });
            }
        }
        ctx.current_task = None;
        tracing::info!(
            workflow = %name,
            run_id = %ctx.run_id,
            spans = ctx.spans.len(),
            "workflow run completed"
        );
        Ok(ctx)
    }
}

/// Dispatch one task. Task lists nest inside gateways, so execution
/// recurses through a boxed future.
fn run_task<'a>(
    task: &'a Task,
    ctx: &'a mut Context,
    continue_on_error: bool,
) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
        match task {
            Task::Service(service) => run_service_task(service, ctx, continue_on_error).await,
            Task::Parallel(gateway) => run_parallel_gateway(gateway, ctx, continue_on_error).await,
            Task::Exclusive(gateway) => {
                run_exclusive_gateway(gateway, ctx, continue_on_error).await
            }
        }
    }
    .boxed()
}

fn base_attributes(id: &str, name: &str, kind: &str, duration_ms: u64) -> VarMap {
    let mut attributes = VarMap::new();
    attributes.insert("task.id".to_string(), json!(id));
    attributes.insert("task.name".to_string(), json!(name));
    attributes.insert("task.kind".to_string(), json!(kind));
    attributes.insert("duration_ms".to_string(), json!(duration_ms));
    attributes
}

async fn run_service_task(
    task: &ServiceTask,
    ctx: &mut Context,
    continue_on_error: bool,
) -> Result<(), EngineError> {
    ctx.current_task = Some(task.id.clone());
    let span_name = format!("service.{}", task.id);
    tracing::debug!(task = %task.id, run_id = %ctx.run_id, "executing service task");
    let start = Instant::now();
    let call = task.handler.call(&*ctx);
    let result = match task.timeout {
        Some(limit) => match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::new(
                ErrorCategory::TaskExecutionError,
                format!("task {} timed out", task.id),
            )
            .with_code("WG-TIME-001")),
        },
        None => call.await,
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    // Span recording happens on every exit path, success or failure.
    match result {
        Ok(updates) => {
            ctx.merge(updates);
            let attributes = base_attributes(&task.id, &task.name, "service", duration_ms);
            ctx.record_span(span_name, SpanStatus::Ok, attributes);
            Ok(())
        }
        Err(error) => {
            let mut attributes = base_attributes(&task.id, &task.name, "service", duration_ms);
            attributes.insert("error".to_string(), json!(error.message));
            ctx.record_span(span_name, SpanStatus::Error, attributes);
            if continue_on_error {
                tracing::warn!(
                    task = %task.id,
                    run_id = %ctx.run_id,
                    error = %error,
                    "service task failed; continuing per workflow policy"
                );
                Ok(())
            } else {
                let message = format!("task {} failed: {}", task.id, error.message);
                Err(EngineError::with_source(
                    ErrorCategory::TaskExecutionError,
                    message,
                    Box::new(error),
                )
                .with_code("WG-TASK-001"))
            }
        }
    }
}

async fn run_parallel_gateway(
    gateway: &ParallelGateway,
    ctx: &mut Context,
    continue_on_error: bool,
) -> Result<(), EngineError> {
    ctx.current_task = Some(gateway.id.clone());
    let span_name = format!("parallel.{}", gateway.id);
    tracing::debug!(
        gateway = %gateway.id,
        run_id = %ctx.run_id,
        branches = gateway.branches.len(),
        "entering parallel gateway"
    );
    let start = Instant::now();

    let mut futures = Vec::new();
    for branch in &gateway.branches {
        let mut branch_ctx = ctx.fork();
        futures.push(async move {
            let mut failure: Option<EngineError> = None;
            for task in branch {
                if let Err(error) = run_task(task, &mut branch_ctx, continue_on_error).await {
                    failure = Some(error);
                    break;
                }
            }
            (branch_ctx, failure)
        });
    }

    // Join: the gateway does not proceed until every branch completes.
    let outcomes = join_all(futures).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    // Deterministic fold of each branch's write map over the parent
    // variables, in branch registration order, last branch wins. Folding
    // the recorded writes (not a diff against pre-fork values) keeps
    // writes that restore a key to its pre-fork value. Branch spans are
    // concatenated in the same order, not in wall-clock completion order,
    // so reports stay reproducible.
    let mut writers: HashMap<String, usize> = HashMap::new();
    let mut first_failure: Option<(usize, EngineError)> = None;
    for (index, (branch_ctx, failure)) in outcomes.into_iter().enumerate() {
        for (key, value) in branch_ctx.writes {
            if let Some(previous) = writers.insert(key.clone(), index) {
                tracing::warn!(
                    gateway = %gateway.id,
                    key = %key,
                    first_branch = previous,
                    winning_branch = index,
                    "parallel branches wrote the same key; last branch wins"
                );
            }
            ctx.set(key, value);
        }
        ctx.extend_spans(branch_ctx.spans);
        if let Some(error) = failure {
            if first_failure.is_none() {
                first_failure = Some((index, error));
            }
        }
    }

    ctx.current_task = Some(gateway.id.clone());
    let mut attributes = base_attributes(&gateway.id, &gateway.name, "parallel", duration_ms);
    attributes.insert("branches".to_string(), json!(gateway.branches.len()));
    match first_failure {
        None => {
            ctx.record_span(span_name, SpanStatus::Ok, attributes);
            Ok(())
        }
        Some((index, error)) => {
            attributes.insert("failed_branch".to_string(), json!(index));
            attributes.insert("error".to_string(), json!(error.message));
            ctx.record_span(span_name, SpanStatus::Error, attributes);
            let message = format!(
                "parallel gateway {} branch {} failed: {}",
                gateway.id, index, error.message
            );
            Err(EngineError::with_source(
                ErrorCategory::BranchExecutionError,
                message,
                Box::new(error),
            )
            .with_code("WG-GATE-002"))
        }
    }
}

async fn run_exclusive_gateway(
    gateway: &ExclusiveGateway,
    ctx: &mut Context,
    continue_on_error: bool,
) -> Result<(), EngineError> {
    ctx.current_task = Some(gateway.id.clone());
    let span_name = format!("exclusive.{}", gateway.id);
    let start = Instant::now();

    // Conditions evaluate in insertion order; the first match wins.
    let selected = gateway
        .conditions
        .iter()
        .find(|(_, condition)| condition(&*ctx))
        .map(|(branch, _)| branch.clone())
        .or_else(|| gateway.default_branch.clone());

    let branch_name = match selected {
        Some(branch) => branch,
        None => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let mut attributes =
                base_attributes(&gateway.id, &gateway.name, "exclusive", duration_ms);
            attributes.insert("conditions".to_string(), json!(gateway.conditions.len()));
            attributes.insert("error".to_string(), json!("no matching branch"));
            ctx.record_span(span_name, SpanStatus::Error, attributes);
            return Err(EngineError::new(
                ErrorCategory::NoMatchingBranch,
                format!(
                    "exclusive gateway {}: no condition matched and no default branch is defined",
                    gateway.id
                ),
            )
            .with_code("WG-GATE-001"));
        }
    };

    let tasks = gateway.paths.get(&branch_name).ok_or_else(|| {
        EngineError::new(
            ErrorCategory::ValidationError,
            format!(
                "exclusive gateway {}: branch '{}' has no task list",
                gateway.id, branch_name
            ),
        )
        .with_code("WG-GATE-003")
    })?;
    tracing::debug!(
        gateway = %gateway.id,
        run_id = %ctx.run_id,
        branch = %branch_name,
        "exclusive gateway selected branch"
    );

    // The selected branch runs sequentially on the unforked parent context.
    let mut failure: Option<EngineError> = None;
    for task in tasks {
        if let Err(error) = run_task(task, ctx, continue_on_error).await {
            failure = Some(error);
            break;
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    ctx.current_task = Some(gateway.id.clone());
    let mut attributes = base_attributes(&gateway.id, &gateway.name, "exclusive", duration_ms);
    attributes.insert("selected_branch".to_string(), json!(branch_name));
    attributes.insert("conditions".to_string(), json!(gateway.conditions.len()));
    match failure {
        None => {
            ctx.record_span(span_name, SpanStatus::Ok, attributes);
            Ok(())
        }
        Some(error) => {
            attributes.insert("error".to_string(), json!(error.message));
            ctx.record_span(span_name, SpanStatus::Error, attributes);
            Err(error)
        }
    }
}
