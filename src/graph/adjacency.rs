//! Fixed-capacity node pool and bitset adjacency matrix
//!
//! The graph never holds more than [`MAX_PASSES`](crate::graph::MAX_PASSES)
//! nodes at once, so dependency edges fit in one `u64` word per node.

use crate::graph::{GraphError, GraphResult, MAX_PASSES};

/// A node discovered during graph construction, wrapping a pass pool index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub pass_index: usize,
}

/// The set of passes reachable backward from the terminal pass
///
/// Node indices are assigned in discovery order and index the rows of the
/// [`AdjacencyMatrix`] built alongside.
pub struct NodeSet {
    nodes: Vec<Node>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(MAX_PASSES),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node for `pass_index`, returning its node index
    pub fn add(&mut self, pass_index: usize) -> GraphResult<usize> {
        if self.nodes.len() >= MAX_PASSES {
            log::error!("node pool exhausted ({} nodes)", MAX_PASSES);
            return Err(GraphError::Capacity(format!(
                "node pool limited to {} entries",
                MAX_PASSES
            )));
        }
        self.nodes.push(Node { pass_index });
        Ok(self.nodes.len() - 1)
    }

    /// Node index of the node wrapping `pass_index`, if discovered
    pub fn find(&self, pass_index: usize) -> Option<usize> {
        self.nodes.iter().position(|n| n.pass_index == pass_index)
    }

    /// Pass pool index wrapped by node `node_index`
    pub fn pass_index(&self, node_index: usize) -> usize {
        self.nodes[node_index].pass_index
    }
}

impl Default for NodeSet {
    fn default() -> Self {
        Self::new()
    }
}

/// 64x64 bitset adjacency matrix
///
/// An edge `(consumer, producer)` is stored as the consumer's bit inside the
/// producer's row, so a row's population count is the number of consumers
/// that depend on that node. The staged scheduler retires nodes whose rows
/// reach zero, which places the terminal pass in stage 0 and its transitive
/// producers in later stages.
pub struct AdjacencyMatrix {
    rows: [u64; MAX_PASSES],
}

impl AdjacencyMatrix {
    pub fn new() -> Self {
        Self {
            rows: [0; MAX_PASSES],
        }
    }

    pub fn clear(&mut self) {
        self.rows = [0; MAX_PASSES];
    }

    /// Record that node `consumer` reads an output of node `producer`
    pub fn set_edge(&mut self, consumer: usize, producer: usize) {
        debug_assert!(consumer < MAX_PASSES && producer < MAX_PASSES);
        self.rows[producer] |= 1 << consumer;
    }

    pub fn has_edge(&self, consumer: usize, producer: usize) -> bool {
        self.rows[producer] & (1 << consumer) != 0
    }

    /// Number of consumers depending on `node`
    pub fn degree(&self, node: usize) -> u32 {
        self.rows[node].count_ones()
    }
}

impl Default for AdjacencyMatrix {
    fn default() -> Self {
        Self::new()
    }
}
