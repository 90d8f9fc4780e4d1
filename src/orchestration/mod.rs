//! Execution layer for task graphs.
//!
//! This module provides the data-flow adapters that decide how task outputs
//! reach later tasks, the worker pools that run a level concurrently, and the
//! executor that walks the levels with a barrier between each.

mod executor;
mod flow;
mod pool;

pub use executor::{ExecOptions, Executor, MergeOrder, RunEvent, RunId, RunState};
pub use flow::{Accumulate, DataFlow, Merge, Record, Replace};
pub use pool::{
    build as build_pool, validate_size, Completion, Job, PoolKind, ThreadPool, TokioPool,
    WorkerPool, DEFAULT_POOL_SIZE, MAX_POOL_SIZE,
};
