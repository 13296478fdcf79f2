//! Topological scheduler
//!
//! Orders graph nodes so every node comes after everything it references,
//! using Kahn's algorithm. Ready nodes are taken in declaration order so the
//! result is deterministic.

use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use std::collections::BTreeSet;

/// Order node ids so that each node follows all of its dependencies
///
/// Fails with [`Error::CycleDetected`] if the graph is not a DAG; no partial
/// ordering is returned in that case.
pub fn schedule(graph: &ResourceGraph) -> Result<Vec<String>> {
    let order = kahn(graph.len(), |i| graph.dependency_indices(i))
        .map_err(|cycle| cycle_error(&cycle, |i| graph.nodes()[i].id()))?;

    log::debug!("Scheduled {} nodes", order.len());
    Ok(order
        .into_iter()
        .map(|i| graph.nodes()[i].id().to_string())
        .collect())
}

/// Group node ids by dependency depth
///
/// Level 0 holds nodes with no dependencies; a node in level `n` depends on
/// at least one node in level `n - 1` and nothing deeper. Nodes in the same
/// level never depend on each other.
pub fn levels(graph: &ResourceGraph) -> Result<Vec<Vec<String>>> {
    let order = kahn(graph.len(), |i| graph.dependency_indices(i))
        .map_err(|cycle| cycle_error(&cycle, |i| graph.nodes()[i].id()))?;

    let mut depth = vec![0usize; graph.len()];
    for &i in &order {
        depth[i] = graph
            .dependency_indices(i)
            .iter()
            .map(|&d| depth[d] + 1)
            .max()
            .unwrap_or(0);
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    for node in graph.nodes() {
        let d = depth[node.order()];
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(node.id().to_string());
    }
    Ok(levels)
}

/// Kahn's algorithm over indices `0..n`
///
/// `deps(i)` lists the indices node `i` depends on. Returns the order with
/// dependencies first, or the indices of one cycle (each depending on the
/// next) if the relation is not acyclic.
pub(crate) fn kahn<'a, F>(n: usize, deps: F) -> std::result::Result<Vec<usize>, Vec<usize>>
where
    F: Fn(usize) -> &'a [usize],
{
    let mut pending = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, count) in pending.iter_mut().enumerate() {
        let node_deps = deps(i);
        *count = node_deps.len();
        for &d in node_deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    Err(find_cycle(n, &deps, &pending))
}

/// Walk unresolved dependencies from the first stuck node until one repeats
///
/// Every stuck node has at least one stuck dependency, so the walk always
/// closes a loop.
fn find_cycle<'a, F>(n: usize, deps: &F, pending: &[usize]) -> Vec<usize>
where
    F: Fn(usize) -> &'a [usize],
{
    let stuck = |i: usize| pending[i] > 0;
    let Some(start) = (0..n).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut position = vec![None; n];
    let mut path = Vec::new();
    let mut current = start;

    loop {
        if let Some(at) = position[current] {
            return path.split_off(at);
        }
        position[current] = Some(path.len());
        path.push(current);

        match deps(current).iter().copied().find(|&d| stuck(d)) {
            Some(next) => current = next,
            None => return path,
        }
    }
}

pub(crate) fn cycle_error<'a, F>(cycle: &[usize], name: F) -> Error
where
    F: Fn(usize) -> &'a str,
{
    Error::CycleDetected {
        cycle: cycle.iter().map(|&i| name(i).to_string()).collect(),
    }
}
