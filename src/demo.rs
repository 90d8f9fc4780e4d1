//! Demo job used by the CLI.
//!
//! Six tasks that each sleep for the `delay` parameter (seconds) and record
//! how long after the job started they finished:
//!
//! ```text
//! foo    bar
//!  |  \  /  \
//!  |   \/    baz
//!  |   /\     |
//! xyzzy  qux  |
//!          \  |
//!           quz
//! ```

use crate::core::{TaskGraph, TaskInput, TaskResult};
use crate::error::Result;
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};

/// Owner context shared by every demo task.
#[derive(Debug, Clone, Copy)]
pub struct Job {
    start: Instant,
}

impl Job {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Sleep for `delay` seconds and return the elapsed time since the job
    /// started, rounded to a tenth of a second.
    pub fn do_work(&self, delay: u64) -> f64 {
        thread::sleep(Duration::from_secs(delay));
        (self.start.elapsed().as_secs_f64() * 10.0).round() / 10.0
    }

    /// Handler body shared by every demo task.
    ///
    /// Accumulate runs see a `Null` state and get `{name: elapsed}` back; pipe
    /// runs get their state back with `name` added.
    fn step(&self, name: &str, input: TaskInput) -> TaskResult {
        let delay = input.param("delay").and_then(Value::as_u64).unwrap_or(0);
        let elapsed = self.do_work(delay);
        match input.state {
            Value::Object(mut state) => {
                state.insert(name.to_string(), json!(elapsed));
                Ok(Value::Object(state))
            }
            _ => Ok(json!({ name: elapsed })),
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

const TASKS: [(&str, &[&str]); 6] = [
    ("foo", &[]),
    ("bar", &[]),
    ("baz", &["bar"]),
    ("qux", &["foo", "bar"]),
    ("quz", &["qux", "baz"]),
    ("xyzzy", &["foo", "bar"]),
];

/// Build the demo task graph.
pub fn graph() -> Result<TaskGraph<Job>> {
    let mut graph = TaskGraph::new();
    for (name, deps) in TASKS {
        graph.register(name, deps.iter().copied(), move |job: &Job, input| job.step(name, input))?;
    }
    Ok(graph)
}
