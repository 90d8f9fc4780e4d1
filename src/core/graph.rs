//! Task registry for dependency-aware execution.
//!
//! `TaskGraph` holds the declared tasks and their direct dependency names.
//! It is built once during initialization and closes for registration the
//! moment an execution entry point runs on it. Leveling turns the registry
//! into a petgraph `DiGraph` (edge dependency -> dependent) and groups it
//! into [`Level`]s.

use crate::core::level::{compute_levels, Level};
use crate::core::task::{Task, TaskInput, TaskResult};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// The task registry.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use taskgraph::TaskGraph;
///
/// let mut graph: TaskGraph<()> = TaskGraph::new();
/// graph.register("fetch", [] as [&str; 0], |_, _| Ok(json!({ "fetch": true }))).unwrap();
/// graph.register("parse", ["fetch"], |_, _| Ok(json!({ "parse": true }))).unwrap();
///
/// assert_eq!(graph.describe(true).unwrap(), "(fetch) -> (parse)");
/// ```
pub struct TaskGraph<C> {
    /// Tasks in registration order.
    tasks: Vec<Task<C>>,
    /// Index from task name into `tasks`.
    index: HashMap<String, usize>,
    /// Set by the first execution entry point.
    closed: AtomicBool,
}

impl<C> TaskGraph<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a task under `name`, requiring every task in `dependencies`.
    ///
    /// Dependencies may name tasks registered later; they are resolved when
    /// the graph is leveled.
    ///
    /// # Errors
    /// - [`Error::DuplicateTask`] if `name` is already registered
    /// - [`Error::RegistryClosed`] once execution has started
    pub fn register<I, S, F>(&mut self, name: impl Into<String>, dependencies: I, handler: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&C, TaskInput) -> TaskResult + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(Error::RegistryClosed);
        }

        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTask(name));
        }

        let dependencies: BTreeSet<String> = dependencies.into_iter().map(Into::into).collect();
        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push(Task::new(name, dependencies, handler));
        Ok(())
    }

    /// Whether registration has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the registry; called by every execution entry point.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Get a task by name.
    pub fn get(&self, name: &str) -> Option<&Task<C>> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct dependency names of a task.
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).map(|t| &t.dependencies)
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Build the dependency graph, resolving every dependency name.
    ///
    /// # Errors
    /// Returns [`Error::UnknownDependency`] for the first task (in
    /// registration order) that names an unregistered dependency.
    fn build_graph(&self) -> Result<DiGraph<String, ()>> {
        let mut graph = DiGraph::with_capacity(self.tasks.len(), self.tasks.len());
        let nodes: Vec<NodeIndex> = self
            .tasks
            .iter()
            .map(|t| graph.add_node(t.name.clone()))
            .collect();

        for (i, task) in self.tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let &dep_index = self.index.get(dep).ok_or_else(|| Error::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                })?;
                graph.add_edge(nodes[dep_index], nodes[i], ());
            }
        }

        Ok(graph)
    }

    /// Group the tasks into dependency-respecting levels.
    ///
    /// Every task lands in the earliest level after all of its dependencies.
    /// Level members are sorted by name.
    ///
    /// # Errors
    /// - [`Error::UnknownDependency`] if a dependency was never registered
    /// - [`Error::CycleDetected`] if the dependencies form a cycle
    pub fn levels(&self) -> Result<Vec<Level>> {
        compute_levels(&self.build_graph()?)
    }

    /// One valid total order of all tasks (levels flattened in order).
    pub fn linear_order(&self) -> Result<Vec<String>> {
        Ok(self
            .levels()?
            .into_iter()
            .flat_map(|level| level.tasks().to_vec())
            .collect())
    }

    /// Render the execution plan without running anything.
    ///
    /// With `parallel = false` the output is a single linear order
    /// (`"a -> b -> c"`); with `parallel = true` it is the level grouping
    /// (`"(a, b) -> (c)"`).
    pub fn describe(&self, parallel: bool) -> Result<String> {
        let levels = self.levels()?;
        let rendered: Vec<String> = if parallel {
            levels.iter().map(Level::to_string).collect()
        } else {
            levels
                .iter()
                .flat_map(|level| level.tasks().iter().cloned())
                .collect()
        };
        Ok(rendered.join(" -> "))
    }
}

impl<C> Default for TaskGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for TaskGraph<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
