//! Core data model for dependency-aware execution.
//!
//! This module contains the task records, the task registry and the
//! leveler that groups registered tasks into dependency-respecting waves.

pub mod graph;
pub mod level;
pub mod task;

pub use graph::TaskGraph;
pub use level::Level;
pub use task::{Handler, Task, TaskError, TaskInput, TaskResult, TaskStatus};
