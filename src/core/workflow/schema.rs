use crate::core::error::EngineError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::context::{Context, VarMap};
use crate::core::workflow::engine::{Engine, Workflow};
use crate::core::workflow::expression::ExpressionEngine;
use crate::core::workflow::task::{ExclusiveGateway, Predicate, Task};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SUPPORTED_VERSION: &str = "1.0";

fn default_context_value() -> Value {
    Value::Object(Map::new())
}

/// Root document for a declarative workflow definition.
///
/// Documents are an adapter: they lower externally authored definitions
/// onto the same [`Task`] abstraction the programmatic API uses, they are
/// not a second execution path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDocument {
    pub version: String,
    #[serde(default)]
    pub metadata: Option<WorkflowMetadata>,
    pub workflow: WorkflowSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Workflow-level definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Seed variables callers may pass as the initial context.
    #[serde(default = "default_context_value")]
    pub context: Value,
    pub tasks: Vec<TaskSpec>,
}

/// Task definition, tagged by `type`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskSpec {
    Service {
        id: String,
        name: Option<String>,
        handler: String,
        timeout_ms: Option<u64>,
    },
    Parallel {
        id: String,
        name: Option<String>,
        branches: Vec<Vec<TaskSpec>>,
    },
    Exclusive {
        id: String,
        name: Option<String>,
        #[serde(default)]
        default: Option<String>,
        branches: Vec<BranchSpec>,
    },
}

impl TaskSpec {
    pub fn id(&self) -> &str {
        match self {
            TaskSpec::Service { id, .. }
            | TaskSpec::Parallel { id, .. }
            | TaskSpec::Exclusive { id, .. } => id,
        }
    }
}

/// One branch of an exclusive gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BranchSpec {
    pub name: String,
    #[serde(default)]
    pub when: Option<ConditionSpec>,
    pub tasks: Vec<TaskSpec>,
}

/// Condition guarding an exclusive-gateway branch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Expr {
        #[serde(rename = "$expr")]
        expr: String,
    },
    Bool(bool),
}

impl WorkflowDocument {
    /// Load and validate a workflow document from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(|err| {
            EngineError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::parse(&text)
    }

    /// Parse and validate a workflow document from YAML text.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let doc: WorkflowDocument = serde_yaml::from_str(text).map_err(|err| {
            EngineError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse workflow document: {}", err),
            )
            .with_code("WG-DOC-001")
        })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Validate the document against schema requirements.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.version != SUPPORTED_VERSION {
            return Err(EngineError::new(
                ErrorCategory::ValidationError,
                format!(
                    "unsupported workflow version {}, expected {}",
                    self.version, SUPPORTED_VERSION
                ),
            )
            .with_code("WG-DOC-002"));
        }
        if self.workflow.tasks.is_empty() {
            return Err(EngineError::new(
                ErrorCategory::ValidationError,
                "workflow must define at least one task",
            )
            .with_code("WG-DOC-003"));
        }
        if !self.workflow.context.is_object() {
            return Err(EngineError::new(
                ErrorCategory::ValidationError,
                "workflow context must be a mapping",
            )
            .with_code("WG-DOC-004"));
        }

        let mut ids = HashSet::new();
        collect_task_ids(&self.workflow.tasks, &mut ids)?;

        let engine = ExpressionEngine::default();
        validate_tasks(&self.workflow.tasks, &engine)?;
        Ok(())
    }

    /// Seed variables declared by the document.
    pub fn initial_variables(&self) -> VarMap {
        match &self.workflow.context {
            Value::Object(map) => map.clone(),
            _ => VarMap::new(),
        }
    }

    /// Lower the document onto the engine's Task abstraction, resolving
    /// handler names against the engine's registry.
    pub fn to_workflow(&self, engine: &Engine) -> Result<Workflow, EngineError> {
        let expr_engine = Arc::new(ExpressionEngine::default());
        let mut tasks = Vec::with_capacity(self.workflow.tasks.len());
        for spec in &self.workflow.tasks {
            tasks.push(build_task(spec, engine, &expr_engine)?);
        }
        Ok(Workflow {
            name: self.workflow.name.clone(),
            tasks,
            continue_on_error: self.workflow.continue_on_error,
        })
    }
}

impl Engine {
    /// Register a validated workflow document under its declared name.
    pub fn register_document(&mut self, document: &WorkflowDocument) -> Result<(), EngineError> {
        let workflow = document.to_workflow(&*self)?;
        self.register_workflow_with_policy(
            workflow.name.clone(),
            workflow.tasks,
            workflow.continue_on_error,
        );
        Ok(())
    }
}

fn collect_task_ids<'a>(
    tasks: &'a [TaskSpec],
    ids: &mut HashSet<&'a str>,
) -> Result<(), EngineError> {
    for task in tasks {
        if !ids.insert(task.id()) {
            return Err(EngineError::new(
                ErrorCategory::ValidationError,
                format!("duplicate task id: {}", task.id()),
            )
            .with_code("WG-DOC-005"));
        }
        match task {
            TaskSpec::Service { .. } => {}
            TaskSpec::Parallel { branches, .. } => {
                for branch in branches {
                    collect_task_ids(branch, ids)?;
                }
            }
            TaskSpec::Exclusive { branches, .. } => {
                for branch in branches {
                    collect_task_ids(&branch.tasks, ids)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_tasks(tasks: &[TaskSpec], engine: &ExpressionEngine) -> Result<(), EngineError> {
    for task in tasks {
        match task {
            TaskSpec::Service { id, handler, .. } => {
                if handler.trim().is_empty() {
                    return Err(EngineError::new(
                        ErrorCategory::ValidationError,
                        format!("task {} has empty handler", id),
                    )
                    .with_code("WG-DOC-006"));
                }
            }
            TaskSpec::Parallel { id, branches, .. } => {
                if branches.is_empty() {
                    return Err(EngineError::new(
                        ErrorCategory::ValidationError,
                        format!("parallel gateway {} has no branches", id),
                    )
                    .with_code("WG-DOC-007"));
                }
                for branch in branches {
                    validate_tasks(branch, engine)?;
                }
            }
            TaskSpec::Exclusive {
                id,
                default,
                branches,
                ..
            } => {
                if branches.is_empty() {
                    return Err(EngineError::new(
                        ErrorCategory::ValidationError,
                        format!("exclusive gateway {} has no branches", id),
                    )
                    .with_code("WG-DOC-007"));
                }
                if let Some(default) = default {
                    if !branches.iter().any(|branch| &branch.name == default) {
                        return Err(EngineError::new(
                            ErrorCategory::ValidationError,
                            format!(
                                "exclusive gateway {}: default branch '{}' is not defined",
                                id, default
                            ),
                        )
                        .with_code("WG-DOC-008"));
                    }
                }
                for branch in branches {
                    match &branch.when {
                        Some(ConditionSpec::Expr { expr }) => {
                            engine.compile(expr)?;
                        }
                        Some(ConditionSpec::Bool(_)) => {}
                        None => {
                            if default.as_deref() != Some(branch.name.as_str()) {
                                return Err(EngineError::new(
                                    ErrorCategory::ValidationError,
                                    format!(
                                        "exclusive gateway {}: branch '{}' needs a condition or must be the default",
                                        id, branch.name
                                    ),
                                )
                                .with_code("WG-DOC-009"));
                            }
                        }
                    }
                    validate_tasks(&branch.tasks, engine)?;
                }
            }
        }
    }
    Ok(())
}

fn build_task(
    spec: &TaskSpec,
    engine: &Engine,
    expr_engine: &Arc<ExpressionEngine>,
) -> Result<Task, EngineError> {
    match spec {
        TaskSpec::Service {
            id,
            name,
            handler,
            timeout_ms,
        } => {
            let display = name.clone().unwrap_or_else(|| id.clone());
            let mut task = engine.create_service_task(id.clone(), display, handler)?;
            if let (Task::Service(service), Some(ms)) = (&mut task, timeout_ms) {
                service.timeout = Some(Duration::from_millis(*ms));
            }
            Ok(task)
        }
        TaskSpec::Parallel { id, name, branches } => {
            let mut built = Vec::with_capacity(branches.len());
            for branch in branches {
                let mut tasks = Vec::with_capacity(branch.len());
                for task in branch {
                    tasks.push(build_task(task, engine, expr_engine)?);
                }
                built.push(tasks);
            }
            let display = name.clone().unwrap_or_else(|| id.clone());
            Ok(Task::parallel(id.clone(), display, built))
        }
        TaskSpec::Exclusive {
            id,
            name,
            default,
            branches,
        } => {
            let display = name.clone().unwrap_or_else(|| id.clone());
            let mut gateway = ExclusiveGateway::new(id.clone(), display);
            for branch in branches {
                let mut tasks = Vec::with_capacity(branch.tasks.len());
                for task in &branch.tasks {
                    tasks.push(build_task(task, engine, expr_engine)?);
                }
                match &branch.when {
                    Some(condition) => {
                        let predicate = build_predicate(condition, expr_engine);
                        gateway = gateway.branch(branch.name.clone(), predicate, tasks);
                    }
                    // Reachable only as the default; validation enforces this.
                    None => {
                        gateway.paths.insert(branch.name.clone(), tasks);
                    }
                }
            }
            gateway.default_branch = default.clone();
            Ok(Task::Exclusive(gateway))
        }
    }
}

fn build_predicate(condition: &ConditionSpec, expr_engine: &Arc<ExpressionEngine>) -> Predicate {
    match condition {
        ConditionSpec::Bool(flag) => {
            let flag = *flag;
            Arc::new(move |_ctx: &Context| flag)
        }
        ConditionSpec::Expr { expr } => {
            let engine = Arc::clone(expr_engine);
            let expr = expr.clone();
            Arc::new(move |ctx: &Context| {
                let variables = Value::Object(ctx.variables.clone());
                match engine.evaluate_predicate(&expr, &variables) {
                    Ok(flag) => flag,
                    Err(error) => {
                        tracing::warn!(
                            expr = %expr,
                            error = %error,
                            "condition evaluation failed; treating as no match"
                        );
                        false
                    }
                }
            })
        }
    }
}

/// Convenience wrapper mirroring the programmatic load path.
pub fn load_workflow(path: &Path) -> Result<WorkflowDocument, EngineError> {
    WorkflowDocument::load_from_file(path)
}
