//! Generated declarations for property tests

use crate::types::NodeDecl;
use proptest::prelude::*;

/// Declarations for nodes `n0..n{size}` in the given order
///
/// Each `(a, b)` pair makes the higher-numbered node reference the lower
/// one, so the graph is acyclic. With `cyclic`, every node also references
/// its predecessor and `n0` references the last node, closing a loop.
pub fn declarations(
    size: usize,
    pairs: &[(usize, usize)],
    declared: &[usize],
    cyclic: bool,
) -> Vec<NodeDecl> {
    declared
        .iter()
        .map(|&i| {
            let mut decl = NodeDecl::new(format!("n{i}"), "x").attr("seq", i);
            for &(a, b) in pairs {
                let (hi, lo) = (a.max(b), a.min(b));
                if hi == i && lo != hi {
                    decl = decl.attr(format!("to_n{lo}"), format!("ref(n{lo}, id)"));
                }
            }
            if cyclic {
                let back = if i == 0 { size - 1 } else { i - 1 };
                decl = decl.attr("back", format!("ref(n{back}, id)"));
            }
            decl
        })
        .collect()
}

/// Random node count, edges, and declaration order
pub fn graph_shape() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<usize>)> {
    (1..12usize).prop_flat_map(|size| {
        (
            Just(size),
            proptest::collection::vec((0..size, 0..size), 0..size * 2),
            Just((0..size).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

/// Acyclic declarations in shuffled order
pub fn dag() -> impl Strategy<Value = Vec<NodeDecl>> {
    graph_shape().prop_map(|(size, pairs, declared)| declarations(size, &pairs, &declared, false))
}

/// Declarations whose graph always contains a cycle
pub fn cyclic() -> impl Strategy<Value = Vec<NodeDecl>> {
    graph_shape().prop_map(|(size, pairs, declared)| declarations(size, &pairs, &declared, true))
}
