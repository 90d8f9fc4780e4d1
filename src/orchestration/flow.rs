//! Data-flow adapters: how a task's output becomes visible to later tasks.
//!
//! The executor owns the run state and is the only code that mutates it.
//! Handlers get an input derived from the state and return a value; the
//! adapter folds that value back in at the merge points between dispatch and
//! the next barrier.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Result mapping built up by accumulate runs.
pub type Record = Map<String, Value>;

/// Contract between the executor and the run state.
pub trait DataFlow {
    /// State threaded through the run.
    type State;

    /// Input state handed to a task. Must not alias `state`.
    fn input(&self, state: &Self::State) -> Value;

    /// Fold a task's output into the state.
    fn apply(&self, state: &mut Self::State, task: &str, output: Value) -> Result<()>;
}

/// Merge each task's `{key: value}` output into one shared record.
///
/// Tasks do not see earlier results. Keys are merged last-write-wins, so two
/// tasks of the same level emitting the same key race unless the executor
/// merges in task-name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accumulate;

impl DataFlow for Accumulate {
    type State = Record;

    fn input(&self, _state: &Record) -> Value {
        Value::Null
    }

    fn apply(&self, state: &mut Record, task: &str, output: Value) -> Result<()> {
        state.extend(into_object(task, output)?);
        Ok(())
    }
}

/// Thread the full state through the tasks; each output replaces it.
///
/// Every task receives its own deep copy, so it cannot mutate the state it
/// was handed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

impl DataFlow for Replace {
    type State = Value;

    fn input(&self, state: &Value) -> Value {
        state.clone()
    }

    fn apply(&self, state: &mut Value, _task: &str, output: Value) -> Result<()> {
        *state = output;
        Ok(())
    }
}

/// Thread the full state through the tasks; each output is an object patch
/// merged key-by-key onto it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merge;

impl Merge {
    /// Check that `state` can take patches.
    pub fn check_state(state: &Value) -> Result<()> {
        if state.is_object() {
            Ok(())
        } else {
            Err(Error::InvalidState(kind(state).to_string()))
        }
    }
}

impl DataFlow for Merge {
    type State = Value;

    fn input(&self, state: &Value) -> Value {
        state.clone()
    }

    fn apply(&self, state: &mut Value, task: &str, output: Value) -> Result<()> {
        let patch = into_object(task, output)?;
        match state {
            Value::Object(map) => {
                map.extend(patch);
                Ok(())
            }
            other => Err(Error::InvalidState(kind(other).to_string())),
        }
    }
}

fn into_object(task: &str, output: Value) -> Result<Record> {
    match output {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidOutput {
            task: task.to_string(),
            found: kind(&other).to_string(),
        }),
    }
}

/// JSON type name, for error messages.
fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
