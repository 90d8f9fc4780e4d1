//! Task records and the handler contract.
//!
//! A task is a named unit of work with a set of named dependencies and a
//! handler bound at registration time. Handlers report their outcome with a
//! tagged [`TaskResult`], so the executor can tell a cooperative abort apart
//! from a real failure without unwinding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome reported by a handler.
pub type TaskResult = std::result::Result<Value, TaskError>;

/// Handler stored in the registry.
///
/// Receives the owner context and the task's input; returns either an output
/// value or a [`TaskError`].
pub type Handler<C> = Arc<dyn Fn(&C, TaskInput) -> TaskResult + Send + Sync>;

/// Everything a handler is given for one invocation.
#[derive(Debug, Clone)]
pub struct TaskInput {
    /// Private copy of the current state for pipe runs, `Null` for
    /// accumulate runs.
    pub state: Value,
    /// Caller parameters, forwarded verbatim to every invocation.
    pub params: Arc<Value>,
}

impl TaskInput {
    /// Create an input with the given state and parameters.
    pub fn new(state: Value, params: Arc<Value>) -> Self {
        Self { state, params }
    }

    /// Look up a single parameter by key.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Non-success outcome of a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Cooperative signal: stop scheduling and report no result.
    #[error("task aborted")]
    Aborted,
    /// Ordinary failure, fatal to the run.
    #[error("{0}")]
    Failed(String),
    /// The handler unwound; set by the engine, never by handlers.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Build a [`TaskError::Failed`] from any displayable error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, TaskError::Aborted)
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(error: serde_json::Error) -> Self {
        Self::failed(error)
    }
}

/// Per-invocation outcome, reported in run events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Handler returned an output.
    Completed,
    /// Handler signalled an abort.
    Aborted,
    /// Handler failed or panicked.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl TaskStatus {
    /// Classify a handler result.
    pub fn of(result: &TaskResult) -> Self {
        match result {
            Ok(_) => TaskStatus::Completed,
            Err(TaskError::Aborted) => TaskStatus::Aborted,
            Err(e) => TaskStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Aborted => write!(f, "aborted"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// A registered task.
pub struct Task<C> {
    /// Unique task name.
    pub name: String,
    /// Names of the tasks that must complete first.
    pub dependencies: BTreeSet<String>,
    /// Bound handler.
    pub handler: Handler<C>,
}

impl<C> Task<C> {
    /// Create a task from its parts.
    pub fn new<F>(name: impl Into<String>, dependencies: BTreeSet<String>, handler: F) -> Self
    where
        F: Fn(&C, TaskInput) -> TaskResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies,
            handler: Arc::new(handler),
        }
    }

    /// Invoke the handler.
    pub fn call(&self, ctx: &C, input: TaskInput) -> TaskResult {
        (self.handler)(ctx, input)
    }
}

impl<C> Clone for Task<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dependencies: self.dependencies.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> std::fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
