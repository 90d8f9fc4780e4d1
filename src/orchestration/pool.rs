//! Worker pools for running one level of tasks concurrently.
//!
//! A `WorkerPool` accepts a batch of jobs, runs them with bounded
//! concurrency, and returns only after every job has finished. That return is
//! the level barrier the executor relies on. Two substrates are provided:
//! scoped OS threads fed by a crossbeam channel, and a dedicated tokio runtime
//! running each job under `spawn_blocking`.

use crate::core::task::{TaskError, TaskResult};
use crate::error::{Error, Result};
use clap::ValueEnum;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, Semaphore};

/// Default number of workers for parallel runs.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Largest accepted pool size.
pub const MAX_POOL_SIZE: usize = 8;

/// A unit of work submitted to a pool.
pub type Job = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// Result of one job, tagged with its submission slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Index of the job in the submitted batch.
    pub slot: usize,
    /// What the job returned.
    pub result: TaskResult,
}

/// Bounded-concurrency execution substrate.
pub trait WorkerPool: Send + Sync {
    /// Maximum number of jobs running at once.
    fn size(&self) -> usize;

    /// Run every job and wait for all of them.
    ///
    /// Completions are returned in the order the jobs finished. A job that
    /// panics is reported as [`TaskError::Panicked`].
    fn run_all(&self, jobs: Vec<Job>) -> Result<Vec<Completion>>;
}

/// Which substrate backs a parallel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Scoped OS threads.
    #[default]
    Threads,
    /// Blocking tasks on a dedicated tokio runtime.
    Tokio,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Threads => write!(f, "threads"),
            PoolKind::Tokio => write!(f, "tokio"),
        }
    }
}

/// Check that `size` is an accepted pool size.
pub fn validate_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_POOL_SIZE {
        return Err(Error::InvalidPoolSize {
            size,
            max: MAX_POOL_SIZE,
        });
    }
    Ok(())
}

/// Build a pool of the given kind.
pub fn build(kind: PoolKind, size: usize) -> Result<Box<dyn WorkerPool>> {
    Ok(match kind {
        PoolKind::Threads => Box::new(ThreadPool::new(size)?),
        PoolKind::Tokio => Box::new(TokioPool::new(size)?),
    })
}

/// Run a job, turning a panic into [`TaskError::Panicked`].
pub(crate) fn guarded<F>(job: F) -> TaskResult
where
    F: FnOnce() -> TaskResult,
{
    panic::catch_unwind(AssertUnwindSafe(job))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pool of scoped OS threads.
///
/// Each batch spawns `min(size, jobs)` named workers that pull jobs from a
/// shared queue; the scope joins them all before `run_all` returns.
#[derive(Debug, Clone)]
pub struct ThreadPool {
    size: usize,
}

impl ThreadPool {
    /// Create a thread pool with `size` workers.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPoolSize`] if `size` is outside `1..=8`.
    pub fn new(size: usize) -> Result<Self> {
        validate_size(size)?;
        Ok(Self { size })
    }
}

impl WorkerPool for ThreadPool {
    fn size(&self) -> usize {
        self.size
    }

    fn run_all(&self, jobs: Vec<Job>) -> Result<Vec<Completion>> {
        let workers = self.size.min(jobs.len());
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, Job)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

        for (slot, job) in jobs.into_iter().enumerate() {
            job_tx
                .send((slot, job))
                .map_err(|e| Error::TaskJoin(e.to_string()))?;
        }
        drop(job_tx);

        thread::scope(|scope| -> Result<()> {
            for n in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                thread::Builder::new()
                    .name(format!("taskgraph-worker-{}", n))
                    .spawn_scoped(scope, move || {
                        for (slot, job) in job_rx.iter() {
                            let result = guarded(job);
                            if done_tx.send(Completion { slot, result }).is_err() {
                                break;
                            }
                        }
                    })?;
            }
            Ok(())
        })?;

        drop(done_tx);
        Ok(done_rx.iter().collect())
    }
}

/// Pool backed by a dedicated tokio runtime.
///
/// Jobs run under `spawn_blocking`; a semaphore with `size` permits bounds how
/// many run at once. `run_all` blocks on the runtime, so it must not be called
/// from inside another tokio runtime.
pub struct TokioPool {
    runtime: Runtime,
    size: usize,
}

impl TokioPool {
    /// Create a tokio-backed pool with `size` permits.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPoolSize`] if `size` is outside `1..=8`, or
    /// [`Error::Io`] if the runtime cannot start.
    pub fn new(size: usize) -> Result<Self> {
        validate_size(size)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name("taskgraph-tokio")
            .build()?;
        Ok(Self { runtime, size })
    }
}

impl std::fmt::Debug for TokioPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioPool").field("size", &self.size).finish()
    }
}

impl WorkerPool for TokioPool {
    fn size(&self) -> usize {
        self.size
    }

    fn run_all(&self, jobs: Vec<Job>) -> Result<Vec<Completion>> {
        self.runtime.block_on(async {
            let permits = Arc::new(Semaphore::new(self.size));
            let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

            let handles: Vec<_> = jobs
                .into_iter()
                .enumerate()
                .map(|(slot, job)| {
                    let permits = Arc::clone(&permits);
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::TaskJoin(e.to_string()))?;
                        let result = match tokio::task::spawn_blocking(move || guarded(job)).await {
                            Ok(result) => result,
                            Err(e) => Err(TaskError::Panicked(e.to_string())),
                        };
                        let _ = done_tx.send(Completion { slot, result });
                        Ok::<(), Error>(())
                    })
                })
                .collect();
            drop(done_tx);

            for joined in join_all(handles).await {
                joined.map_err(|e| Error::TaskJoin(e.to_string()))??;
            }

            let mut completions = Vec::new();
            while let Some(completion) = done_rx.recv().await {
                completions.push(completion);
            }
            Ok::<_, Error>(completions)
        })
    }
}
