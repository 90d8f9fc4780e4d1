//! Level-grouped topological sort.
//!
//! A level is a set of mutually independent tasks whose dependencies all sit
//! in earlier levels. Levels are produced with Kahn's algorithm: the first
//! level holds every task without dependencies, and each following level holds
//! the tasks whose last unresolved dependency was in the level before it.

use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashSet;

/// One dependency-respecting wave of tasks.
///
/// Members are kept sorted by name so output is stable; tasks within a level
/// are logically unordered with respect to each other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Level(Vec<String>);

impl Level {
    /// Build a level from task names, sorting them.
    pub fn new(mut tasks: Vec<String>) -> Self {
        tasks.sort();
        Self(tasks)
    }

    /// Task names in this level, sorted.
    pub fn tasks(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|t| t == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

impl<'a> IntoIterator for &'a Level {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Group the nodes of `graph` into levels.
///
/// Edges point from a dependency to its dependent. Node weights are task
/// names.
///
/// # Errors
/// Returns [`Error::CycleDetected`] naming the members of one cycle when the
/// graph is not acyclic.
pub fn compute_levels(graph: &DiGraph<String, ()>) -> Result<Vec<Level>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut current: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();

    let mut levels = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        placed += current.len();

        let mut next = Vec::new();
        for &node in &current {
            for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    next.push(dependent);
                }
            }
        }

        levels.push(Level::new(
            current.iter().map(|&n| graph[n].clone()).collect(),
        ));
        current = next;
    }

    if placed != graph.node_count() {
        let unresolved: HashSet<NodeIndex> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] > 0)
            .collect();
        return Err(Error::CycleDetected {
            tasks: cycle_members(graph, &unresolved),
        });
    }

    Ok(levels)
}

/// Names of the tasks on one cycle among `unresolved` nodes, sorted.
fn cycle_members(graph: &DiGraph<String, ()>, unresolved: &HashSet<NodeIndex>) -> Vec<String> {
    let cyclic = tarjan_scc(graph).into_iter().find(|component| {
        component.iter().all(|n| unresolved.contains(n))
            && (component.len() > 1 || graph.contains_edge(component[0], component[0]))
    });

    let mut names: Vec<String> = match cyclic {
        Some(component) => component.into_iter().map(|n| graph[n].clone()).collect(),
        // Unreachable for a graph with leftover nodes, but never report an empty cycle.
        None => unresolved.iter().map(|&n| graph[n].clone()).collect(),
    };
    names.sort();
    names
}
