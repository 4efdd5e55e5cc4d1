//! Staged topological scheduler
//!
//! Retires nodes in sweeps: every node whose row degree has reached zero is
//! appended to the compiled list with the current stage number, then its bit
//! is cleared from the remaining rows. A sweep that retires nothing while
//! nodes remain means the dependency set contains a cycle.

use crate::graph::adjacency::{AdjacencyMatrix, NodeSet};
use crate::graph::{GraphError, GraphResult};

/// One entry of the compiled execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledNode {
    pub stage: u32,
    pub pass_index: usize,
}

/// Produce the staged compiled order for the discovered subgraph
///
/// Degrees count consumers, so the terminal pass (which nothing consumes)
/// lands in stage 0 and its transitive producers follow in later stages.
/// Fails with [`GraphError::Unresolvable`] without producing a partial order.
pub fn schedule(nodes: &NodeSet, matrix: &AdjacencyMatrix) -> GraphResult<Vec<CompiledNode>> {
    let count = nodes.len();
    let mut degrees: Vec<u32> = (0..count).map(|i| matrix.degree(i)).collect();
    let mut retired = 0u64;
    let mut compiled = Vec::with_capacity(count);
    let mut stage = 0u32;

    loop {
        let mut ready: Vec<usize> = (0..count)
            .filter(|&i| retired & (1 << i) == 0 && degrees[i] == 0)
            .collect();
        if ready.is_empty() {
            break;
        }

        // Within a stage, passes come out in pool-slot order
        ready.sort_by_key(|&i| nodes.pass_index(i));

        for &node in &ready {
            compiled.push(CompiledNode {
                stage,
                pass_index: nodes.pass_index(node),
            });
            retired |= 1 << node;
        }

        for &node in &ready {
            for other in 0..count {
                if retired & (1 << other) == 0 && matrix.has_edge(node, other) {
                    degrees[other] -= 1;
                }
            }
        }

        stage += 1;
    }

    if compiled.len() != count {
        log::error!(
            "dependency cycle: retired {} of {} passes",
            compiled.len(),
            count
        );
        return Err(GraphError::Unresolvable(format!(
            "{} of {} passes form a cycle",
            count - compiled.len(),
            count
        )));
    }

    Ok(compiled)
}
