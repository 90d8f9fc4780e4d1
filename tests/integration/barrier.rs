//! Level barrier tests, observed through run events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;
use taskgraph::{ExecOptions, Executor, PoolKind, RunEvent, RunState, TaskGraph, TaskStatus};

use crate::fixtures::{collect_events, position, reference_graph, reference_graph_failing, Recorder};

fn level_index(graph: &TaskGraph<Recorder>) -> HashMap<String, usize> {
    graph
        .levels()
        .unwrap()
        .iter()
        .enumerate()
        .flat_map(|(i, l)| l.iter().map(move |t| (t.clone(), i)))
        .collect()
}

/// Test: No task of level k+1 starts before level k finishes
/// Given the reference graph with slow handlers
/// When run in parallel on each substrate
/// Then every TaskFinished of level k precedes every TaskStarted of level k+1
#[test]
fn test_barrier_between_levels() {
    for substrate in [PoolKind::Threads, PoolKind::Tokio] {
        let graph = reference_graph();
        let levels = level_index(&graph);
        let (tx, rx) = crossbeam_channel::unbounded();
        let options = ExecOptions {
            pool_size: 4,
            substrate,
            ..ExecOptions::default()
        };

        let mut executor = Executor::parallel(&graph, &options).unwrap().with_events(tx);
        executor
            .accumulate(Recorder::default(), json!({ "delay_ms": 20 }))
            .unwrap()
            .unwrap();
        assert_eq!(executor.state(), RunState::Completed);
        drop(executor);
        let events = collect_events(rx);

        for (i, event) in events.iter().enumerate() {
            if let RunEvent::TaskStarted { task } = event {
                let level = levels[task];
                let earlier_unfinished = events[i..].iter().any(|later| {
                    matches!(later, RunEvent::TaskFinished { task: t, .. } if levels[t] < level)
                });
                assert!(!earlier_unfinished, "{} started before an earlier level finished ({})", task, substrate);
            }
        }
    }
}

/// Test: Run event lifecycle
/// Given the reference graph
/// When run serially with events
/// Then events bracket every level and the run
#[test]
fn test_event_lifecycle() {
    let graph = reference_graph();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut executor = Executor::serial(&graph).with_events(tx);
    let run_id = executor.run_id();
    executor.accumulate(Recorder::default(), json!({})).unwrap();
    drop(executor);
    let events = collect_events(rx);

    assert_eq!(events.first(), Some(&RunEvent::RunStarted { run_id, levels: 3 }));
    assert_eq!(events.last(), Some(&RunEvent::RunCompleted));
    for index in 0..3 {
        let started = position(&events, |e| matches!(e, RunEvent::LevelStarted { index: i, .. } if *i == index));
        let completed = position(&events, |e| *e == RunEvent::LevelCompleted { index });
        assert!(started.unwrap() < completed.unwrap());
    }
    let started = events
        .iter()
        .filter(|e| matches!(e, RunEvent::TaskStarted { .. }))
        .count();
    assert_eq!(started, 5);
}

/// Test: Abort events
/// Given baz aborts
/// When run in parallel
/// Then RunAborted names baz, level 1 never completes, and quz never starts
#[test]
fn test_abort_events() {
    let graph = reference_graph_failing("baz", taskgraph::TaskError::Aborted);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut executor = Executor::parallel(&graph, &ExecOptions::default())
        .unwrap()
        .with_events(tx);
    assert_eq!(executor.accumulate(Recorder::default(), json!({})).unwrap(), None);
    drop(executor);
    let events = collect_events(rx);

    assert_eq!(
        events.last(),
        Some(&RunEvent::RunAborted {
            task: "baz".to_string()
        })
    );
    assert!(events.contains(&RunEvent::TaskFinished {
        task: "baz".to_string(),
        status: TaskStatus::Aborted,
        output: None,
    }));
    assert!(!events.contains(&RunEvent::LevelCompleted { index: 1 }));
    assert!(position(&events, |e| matches!(e, RunEvent::TaskStarted { task } if task == "quz")).is_none());
}

/// Test: Pool size bounds concurrency within a level
/// Given six independent slow tasks and a pool of two
/// When run in parallel
/// Then at most two handlers ever run at once
#[test]
fn test_pool_size_bounds_level() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut graph: TaskGraph<()> = TaskGraph::new();
    for i in 0..6 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let name = format!("task{}", i);
        let key = name.clone();
        graph
            .register(name, [] as [&str; 0], move |_, _| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(25));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({ key.clone(): true }))
            })
            .unwrap();
    }

    let record = graph.run_parallel((), json!({}), 2).unwrap().unwrap();
    assert_eq!(record.len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}
