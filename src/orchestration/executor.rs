//! Level-by-level executor.
//!
//! The executor levels the registry once per run, then walks the levels in
//! order. Serial runs invoke one task at a time; parallel runs hand a whole
//! level to a [`WorkerPool`] and wait for every task of the level before
//! merging results and moving on. No task of level k+1 is dispatched before
//! every task of level k has finished.
//!
//! A task that aborts stops scheduling of later levels and the run reports no
//! result. Tasks already dispatched in the same level are not preempted. Any
//! other task failure is fatal: the error propagates and partial results are
//! discarded.

use crate::core::graph::TaskGraph;
use crate::core::task::{Task, TaskError, TaskInput, TaskResult, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::flow::{Accumulate, DataFlow, Merge, Record, Replace};
use crate::orchestration::pool::{self, guarded, Job, PoolKind, WorkerPool, DEFAULT_POOL_SIZE};
use crate::{tglog, tglog_debug, tglog_error, tglog_trace, tglog_warn};
use clap::ValueEnum;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single run.
///
/// Pending -> Leveling -> Level(0) -> ... -> Level(n-1) -> Completed,
/// with Aborted and Failed reachable from any non-terminal state after
/// Pending (Failed also directly from Pending when the input is rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Pending,
    Leveling,
    Level(usize),
    Completed,
    Aborted,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Aborted | RunState::Failed
        )
    }

    /// Check if moving from `self` to `target` is allowed.
    pub fn can_transition(&self, target: RunState) -> bool {
        match (*self, target) {
            (RunState::Pending, RunState::Leveling | RunState::Failed) => true,
            (RunState::Leveling, RunState::Level(0) | RunState::Completed | RunState::Failed) => {
                true
            }
            (RunState::Level(i), RunState::Level(j)) => j == i + 1,
            (
                RunState::Level(_),
                RunState::Completed | RunState::Aborted | RunState::Failed,
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Leveling => write!(f, "leveling"),
            RunState::Level(i) => write!(f, "level {}", i),
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted => write!(f, "aborted"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Order in which a parallel level's outputs are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrder {
    /// Merge as tasks finish. Colliding keys are nondeterministic.
    #[default]
    Completion,
    /// Merge sorted by task name; the last name wins a collision.
    TaskName,
}

/// Events emitted while a run progresses.
///
/// Task start/finish events are sent from the thread running the task, so
/// their order on the channel reflects real execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Leveling succeeded and execution is starting.
    RunStarted {
        /// The run.
        run_id: RunId,
        /// Number of levels to execute.
        levels: usize,
    },
    /// A level is about to be dispatched.
    LevelStarted {
        /// Level index.
        index: usize,
        /// Members of the level, sorted.
        tasks: Vec<String>,
    },
    /// A handler is about to be invoked.
    TaskStarted {
        /// The task.
        task: String,
    },
    /// A handler returned.
    TaskFinished {
        /// The task.
        task: String,
        /// How it ended.
        status: TaskStatus,
        /// The handler's output, if it returned one.
        output: Option<Value>,
    },
    /// Every task of a level finished and its outputs were merged.
    LevelCompleted {
        /// Level index.
        index: usize,
    },
    /// The run produced a result.
    RunCompleted,
    /// A task aborted the run.
    RunAborted {
        /// The task that signalled the abort.
        task: String,
    },
    /// The run failed.
    RunFailed {
        /// Error message.
        error: String,
    },
}

/// Options for parallel runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Worker pool capacity, in `1..=8`.
    pub pool_size: usize,
    /// Pool substrate.
    pub substrate: PoolKind,
    /// Merge order for level outputs.
    pub merge_order: MergeOrder,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            substrate: PoolKind::default(),
            merge_order: MergeOrder::default(),
        }
    }
}

/// Drives one run over a task graph.
///
/// An executor runs once; build a new one for the next run.
pub struct Executor<'g, C> {
    graph: &'g TaskGraph<C>,
    /// `None` runs serially.
    pool: Option<Box<dyn WorkerPool>>,
    merge_order: MergeOrder,
    events: Option<Sender<RunEvent>>,
    state: RunState,
    run_id: RunId,
}

impl<'g, C> Executor<'g, C>
where
    C: Send + Sync + 'static,
{
    /// Executor that runs one task at a time.
    pub fn serial(graph: &'g TaskGraph<C>) -> Self {
        Self {
            graph,
            pool: None,
            merge_order: MergeOrder::default(),
            events: None,
            state: RunState::Pending,
            run_id: RunId::new(),
        }
    }

    /// Executor that builds one pool up front and runs every level on it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPoolSize`] or a pool construction error.
    pub fn parallel(graph: &'g TaskGraph<C>, options: &ExecOptions) -> Result<Self> {
        let pool = pool::build(options.substrate, options.pool_size)?;
        Ok(Self::with_pool(graph, pool).with_merge_order(options.merge_order))
    }

    /// Executor that runs each level on the given pool.
    pub fn with_pool(graph: &'g TaskGraph<C>, pool: Box<dyn WorkerPool>) -> Self {
        Self {
            pool: Some(pool),
            ..Self::serial(graph)
        }
    }

    /// Send run events to `events`.
    pub fn with_events(mut self, events: Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_merge_order(mut self, merge_order: MergeOrder) -> Self {
        self.merge_order = merge_order;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Run with the accumulate contract.
    ///
    /// Every task gets `params` and a `Null` state; its object output is
    /// merged into the result record. Returns `Ok(None)` if a task aborted.
    pub fn accumulate(&mut self, ctx: impl Into<Arc<C>>, params: Value) -> Result<Option<Record>> {
        self.drive(ctx.into(), &Accumulate, Record::new(), Arc::new(params))
    }

    /// Run with the pipe contract.
    ///
    /// Serial runs replace the state with each task's output. Parallel runs
    /// give every task of a level its own copy of the state and merge their
    /// object patches onto it after the barrier; `state` must then be an
    /// object. Returns `Ok(None)` if a task aborted.
    pub fn pipe(&mut self, ctx: impl Into<Arc<C>>, state: Value, params: Value) -> Result<Option<Value>> {
        let ctx = ctx.into();
        let params = Arc::new(params);
        if !self.is_parallel() {
            return self.drive(ctx, &Replace, state, params);
        }
        self.graph.close();
        if let Err(e) = Merge::check_state(&state) {
            self.transition(RunState::Failed)?;
            return Err(self.fail(e));
        }
        self.drive(ctx, &Merge, state, params)
    }

    fn transition(&mut self, target: RunState) -> Result<()> {
        if !self.state.can_transition(target) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    fn emit(&self, event: RunEvent) {
        emit(&self.events, event);
    }

    fn drive<F: DataFlow>(
        &mut self,
        ctx: Arc<C>,
        flow: &F,
        state: F::State,
        params: Arc<Value>,
    ) -> Result<Option<F::State>> {
        self.transition(RunState::Leveling)?;
        self.graph.close();

        match self.drive_levels(&ctx, flow, state, &params) {
            Ok(Ok(state)) => {
                self.transition(RunState::Completed)?;
                tglog!("run {} completed", self.run_id.short());
                self.emit(RunEvent::RunCompleted);
                Ok(Some(state))
            }
            Ok(Err(task)) => {
                self.transition(RunState::Aborted)?;
                tglog_warn!("run {} aborted by task {}", self.run_id.short(), task);
                self.emit(RunEvent::RunAborted { task });
                Ok(None)
            }
            Err(e) => {
                self.state = RunState::Failed;
                Err(self.fail(e))
            }
        }
    }

    /// Report a failed run and hand the error back.
    fn fail(&self, e: Error) -> Error {
        tglog_error!("run {} failed: {}", self.run_id.short(), e);
        self.emit(RunEvent::RunFailed {
            error: e.to_string(),
        });
        e
    }

    /// Execute every level. The inner `Err` carries the name of the task
    /// that aborted the run.
    fn drive_levels<F: DataFlow>(
        &mut self,
        ctx: &Arc<C>,
        flow: &F,
        mut state: F::State,
        params: &Arc<Value>,
    ) -> Result<std::result::Result<F::State, String>> {
        let levels = self.graph.levels()?;
        tglog!(
            "run {} started: {} tasks in {} levels ({})",
            self.run_id.short(),
            self.graph.len(),
            levels.len(),
            if self.is_parallel() { "parallel" } else { "serial" }
        );
        self.emit(RunEvent::RunStarted {
            run_id: self.run_id,
            levels: levels.len(),
        });

        for (index, level) in levels.iter().enumerate() {
            self.transition(RunState::Level(index))?;
            tglog_debug!("run {} level {}: {}", self.run_id.short(), index, level);
            self.emit(RunEvent::LevelStarted {
                index,
                tasks: level.tasks().to_vec(),
            });

            let tasks = level
                .iter()
                .map(|name| self.task(name))
                .collect::<Result<Vec<_>>>()?;

            let aborted = match &self.pool {
                Some(pool) => self.run_level_parallel(pool.as_ref(), &tasks, ctx, flow, &mut state, params)?,
                None => self.run_level_serial(&tasks, ctx, flow, &mut state, params)?,
            };
            if let Some(task) = aborted {
                return Ok(Err(task));
            }

            self.emit(RunEvent::LevelCompleted { index });
        }

        Ok(Ok(state))
    }

    fn task(&self, name: &str) -> Result<&'g Task<C>> {
        self.graph
            .get(name)
            .ok_or_else(|| Error::Validation(format!("Task {} not found in graph", name)))
    }

    /// Build the unit of work for one invocation.
    fn job(&self, task: &Task<C>, ctx: &Arc<C>, input: TaskInput) -> impl FnOnce() -> TaskResult + Send + 'static {
        let handler = Arc::clone(&task.handler);
        let ctx = Arc::clone(ctx);
        let name = task.name.clone();
        let events = self.events.clone();
        move || {
            tglog_trace!("task {} started", name);
            emit(&events, RunEvent::TaskStarted { task: name.clone() });
            let result = guarded(|| handler(ctx.as_ref(), input));
            let status = TaskStatus::of(&result);
            tglog_trace!("task {} {}", name, status);
            emit(
                &events,
                RunEvent::TaskFinished {
                    task: name,
                    status,
                    output: result.as_ref().ok().cloned(),
                },
            );
            result
        }
    }

    fn run_level_serial<F: DataFlow>(
        &self,
        tasks: &[&Task<C>],
        ctx: &Arc<C>,
        flow: &F,
        state: &mut F::State,
        params: &Arc<Value>,
    ) -> Result<Option<String>> {
        for task in tasks {
            let input = TaskInput::new(flow.input(state), Arc::clone(params));
            match self.job(task, ctx, input)() {
                Ok(output) => flow.apply(state, &task.name, output)?,
                Err(e) => return outcome(&task.name, e),
            }
        }
        Ok(None)
    }

    fn run_level_parallel<F: DataFlow>(
        &self,
        pool: &dyn WorkerPool,
        tasks: &[&Task<C>],
        ctx: &Arc<C>,
        flow: &F,
        state: &mut F::State,
        params: &Arc<Value>,
    ) -> Result<Option<String>> {
        let jobs: Vec<Job> = tasks
            .iter()
            .map(|task| {
                let input = TaskInput::new(flow.input(state), Arc::clone(params));
                Box::new(self.job(task, ctx, input)) as Job
            })
            .collect();

        let completions = pool.run_all(jobs)?;

        // Barrier cleared: every task of the level has returned.
        let mut results: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let mut finish_order = Vec::with_capacity(tasks.len());
        for completion in completions {
            if let Some(slot) = results.get_mut(completion.slot) {
                *slot = Some(completion.result);
                finish_order.push(completion.slot);
            }
        }

        let mut outputs = Vec::with_capacity(tasks.len());
        for (task, result) in tasks.iter().zip(results) {
            match result {
                Some(Ok(output)) => outputs.push(Some(output)),
                Some(Err(e)) => return outcome(&task.name, e),
                None => {
                    return Err(Error::TaskJoin(format!(
                        "task `{}` did not report a result",
                        task.name
                    )))
                }
            }
        }

        let merge_slots: Vec<usize> = match self.merge_order {
            MergeOrder::Completion => finish_order,
            MergeOrder::TaskName => (0..tasks.len()).collect(),
        };
        for slot in merge_slots {
            if let Some(output) = outputs[slot].take() {
                flow.apply(state, &tasks[slot].name, output)?;
            }
        }

        Ok(None)
    }
}

fn emit(events: &Option<Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Map a handler error to the run outcome: `Ok(Some(task))` for an abort,
/// an error for anything else.
fn outcome(task: &str, error: TaskError) -> Result<Option<String>> {
    match error {
        TaskError::Aborted => Ok(Some(task.to_string())),
        TaskError::Failed(message) => Err(Error::TaskFailed {
            task: task.to_string(),
            message,
        }),
        TaskError::Panicked(message) => Err(Error::TaskPanicked {
            task: task.to_string(),
            message,
        }),
    }
}

/// Execution entry points on the registry.
///
/// Each entry point closes the registry for further registration.
impl<C> TaskGraph<C>
where
    C: Send + Sync + 'static,
{
    /// Run serially, accumulating outputs into one record.
    pub fn run(&self, ctx: impl Into<Arc<C>>, params: Value) -> Result<Option<Record>> {
        self.close();
        Executor::serial(self).accumulate(ctx, params)
    }

    /// Run levels on a thread pool of `pool_size`, accumulating outputs.
    pub fn run_parallel(
        &self,
        ctx: impl Into<Arc<C>>,
        params: Value,
        pool_size: usize,
    ) -> Result<Option<Record>> {
        self.close();
        let options = ExecOptions {
            pool_size,
            ..ExecOptions::default()
        };
        Executor::parallel(self, &options)?.accumulate(ctx, params)
    }

    /// Run serially, threading `state` through every task.
    pub fn pipe(&self, ctx: impl Into<Arc<C>>, state: Value, params: Value) -> Result<Option<Value>> {
        self.close();
        Executor::serial(self).pipe(ctx, state, params)
    }

    /// Run levels on a thread pool of `pool_size`, merging each task's patch
    /// onto `state` after its level.
    pub fn pipe_parallel(
        &self,
        ctx: impl Into<Arc<C>>,
        state: Value,
        params: Value,
        pool_size: usize,
    ) -> Result<Option<Value>> {
        self.close();
        let options = ExecOptions {
            pool_size,
            ..ExecOptions::default()
        };
        Executor::parallel(self, &options)?.pipe(ctx, state, params)
    }
}
