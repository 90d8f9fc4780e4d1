//! Dependency-aware task execution.
//!
//! Register named tasks with the names of the tasks they depend on, then run
//! them serially or with independent tasks grouped into levels and run
//! concurrently. Results either accumulate into one JSON record or flow from
//! task to task as a piped state.

pub mod config;
pub mod core;
pub mod demo;
pub mod error;
pub mod log;
pub mod orchestration;

pub use crate::core::{Level, Task, TaskError, TaskGraph, TaskInput, TaskResult, TaskStatus};
pub use error::{Error, Result};
pub use orchestration::{
    ExecOptions, Executor, MergeOrder, PoolKind, Record, RunEvent, RunId, RunState,
    DEFAULT_POOL_SIZE,
};
