//! Cooperative abort and fatal failure tests.

use std::sync::Arc;

use serde_json::json;
use taskgraph::{Error, Executor, RunState, TaskError, TaskGraph};

use crate::fixtures::{reference_graph_failing, Recorder};

/// Test: Failure propagates, dependents never run
/// Given baz fails with a generic error
/// When the graph runs serially
/// Then the failure reaches the caller and quz is never invoked
#[test]
fn test_serial_failure_propagates() {
    let graph = reference_graph_failing("baz", TaskError::failed("baz exploded"));
    let rec = Arc::new(Recorder::default());

    match graph.run(rec.clone(), json!({})) {
        Err(Error::TaskFailed { task, message }) => {
            assert_eq!(task, "baz");
            assert_eq!(message, "baz exploded");
        }
        other => panic!("Expected TaskFailed, got {:?}", other),
    }
    assert!(rec.called("baz"));
    assert!(!rec.called("quz"));
}

/// Test: Failure in a parallel level
/// Given baz fails
/// When the graph runs in parallel
/// Then qux still finishes (same level) but quz never runs
#[test]
fn test_parallel_failure_propagates() {
    let graph = reference_graph_failing("baz", TaskError::failed("baz exploded"));
    let rec = Arc::new(Recorder::default());

    let err = graph.run_parallel(rec.clone(), json!({}), 4).unwrap_err();
    assert!(matches!(err, Error::TaskFailed { ref task, .. } if task == "baz"));
    assert!(rec.called("qux"));
    assert!(!rec.called("quz"));
}

/// Test: Abort returns no result
/// Given baz signals Abort
/// When the graph runs under each strategy
/// Then every strategy returns None and quz is never invoked
#[test]
fn test_abort_under_every_strategy() {
    let graph = reference_graph_failing("baz", TaskError::Aborted);

    let rec = Arc::new(Recorder::default());
    assert_eq!(graph.run(rec.clone(), json!({})).unwrap(), None);
    assert!(!rec.called("quz"));

    let rec = Arc::new(Recorder::default());
    assert_eq!(graph.run_parallel(rec.clone(), json!({}), 2).unwrap(), None);
    assert!(!rec.called("quz"));

    let rec = Arc::new(Recorder::default());
    assert_eq!(graph.pipe(rec.clone(), json!({}), json!({})).unwrap(), None);
    assert!(!rec.called("quz"));

    let rec = Arc::new(Recorder::default());
    assert_eq!(graph.pipe_parallel(rec.clone(), json!({}), json!({}), 2).unwrap(), None);
    assert!(!rec.called("quz"));
}

/// Test: Abort sentinel stays untouched
/// Given a counter that only later levels would bump
/// When a first-level task aborts
/// Then the counter is untouched
#[test]
fn test_abort_counter_untouched() {
    let sentinel = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut graph: TaskGraph<()> = TaskGraph::new();
    graph
        .register("gate", [] as [&str; 0], |_, _| Err(TaskError::Aborted))
        .unwrap();
    graph
        .register("sibling", [] as [&str; 0], |_, _| Ok(json!({ "sibling": true })))
        .unwrap();
    for name in ["after", "later"] {
        let sentinel = Arc::clone(&sentinel);
        graph
            .register(name, ["gate", "sibling"], move |_, _| {
                sentinel.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(json!({ name: true }))
            })
            .unwrap();
    }

    let mut executor = Executor::serial(&graph);
    assert_eq!(executor.accumulate((), json!({})).unwrap(), None);
    assert_eq!(executor.state(), RunState::Aborted);
    assert_eq!(graph.run_parallel((), json!({}), 2).unwrap(), None);
    assert_eq!(sentinel.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// Test: Failure wins over abort in the same level
/// Given a level where one task aborts and a later-named one fails
/// When run in parallel
/// Then the first non-success outcome in name order decides the run
#[test]
fn test_first_outcome_in_name_order_decides() {
    let mut graph: TaskGraph<()> = TaskGraph::new();
    graph
        .register("a_abort", [] as [&str; 0], |_, _| Err(TaskError::Aborted))
        .unwrap();
    graph
        .register("b_fail", [] as [&str; 0], |_, _| Err(TaskError::failed("bad")))
        .unwrap();
    assert_eq!(graph.run_parallel((), json!({}), 2).unwrap(), None);

    let mut graph: TaskGraph<()> = TaskGraph::new();
    graph
        .register("a_fail", [] as [&str; 0], |_, _| Err(TaskError::failed("bad")))
        .unwrap();
    graph
        .register("b_abort", [] as [&str; 0], |_, _| Err(TaskError::Aborted))
        .unwrap();
    assert!(matches!(
        graph.run_parallel((), json!({}), 2),
        Err(Error::TaskFailed { ref task, .. }) if task == "a_fail"
    ));
}

/// Test: Panicking handler is reported, not propagated as unwind
#[test]
fn test_panic_reported_as_error() {
    let mut graph: TaskGraph<()> = TaskGraph::new();
    graph
        .register("boom", [] as [&str; 0], |_, _| panic!("kaboom"))
        .unwrap();
    graph
        .register("after", ["boom"], |_, _| Ok(json!({ "after": true })))
        .unwrap();

    for result in [graph.run((), json!({})), graph.run_parallel((), json!({}), 2)] {
        match result {
            Err(Error::TaskPanicked { task, message }) => {
                assert_eq!(task, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("Expected TaskPanicked, got {:?}", other),
        }
    }
}

/// Test: Non-object accumulate output is rejected
#[test]
fn test_non_object_output_fails() {
    let mut graph: TaskGraph<()> = TaskGraph::new();
    graph
        .register("list", [] as [&str; 0], |_, _| Ok(json!(["not", "a", "map"])))
        .unwrap();
    match graph.run_parallel((), json!({}), 1) {
        Err(Error::InvalidOutput { task, found }) => {
            assert_eq!(task, "list");
            assert_eq!(found, "an array");
        }
        other => panic!("Expected InvalidOutput, got {:?}", other),
    }
}
