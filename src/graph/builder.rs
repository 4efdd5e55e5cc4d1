//! Backward graph discovery
//!
//! Starting from the terminal pass, each input name is matched against the
//! output lists of all Used passes to find its producer. Matched producers
//! become nodes, the match becomes an edge, and the attachment itself is
//! marked for a layout-transition barrier since it crosses a pass boundary.

use crate::backend::AttachmentKind;
use crate::graph::adjacency::{AdjacencyMatrix, NodeSet};
use crate::graph::attachment::AttachmentRegistry;
use crate::graph::pass::PassTable;
use crate::graph::{GraphError, GraphResult, MAX_PASSES, TERMINAL_PASS};
use std::collections::HashMap;

pub struct GraphBuilder<'a> {
    pub passes: &'a PassTable,
    pub registry: &'a AttachmentRegistry,
    pub nodes: &'a mut NodeSet,
    pub matrix: &'a mut AdjacencyMatrix,
}

impl GraphBuilder<'_> {
    /// Discover the subgraph reachable backward from the terminal pass
    ///
    /// Uses an explicit worklist instead of recursion; depth is bounded by
    /// the node cap. Input names with no producer among the Used passes are
    /// assumed externally provided and are not an error.
    ///
    /// Returns the barrier table for the discovered subgraph; the caller
    /// commits it to the registry once the whole build has succeeded.
    pub fn discover(&mut self) -> GraphResult<HashMap<String, AttachmentKind>> {
        self.nodes.clear();
        self.matrix.clear();
        let mut barriers = HashMap::new();

        let Some(terminal) = self.passes.find(TERMINAL_PASS) else {
            log::error!("terminal pass '{}' not found", TERMINAL_PASS);
            return Err(GraphError::NotFound(format!(
                "terminal pass '{}'",
                TERMINAL_PASS
            )));
        };

        let root = self.nodes.add(terminal)?;
        let mut worklist = Vec::with_capacity(MAX_PASSES);
        worklist.push(root);

        while let Some(consumer_node) = worklist.pop() {
            let consumer_pass = self.nodes.pass_index(consumer_node);

            for input_index in 0..self.passes.entry(consumer_pass).inputs.len() {
                let input = &self.passes.entry(consumer_pass).inputs[input_index];

                let Some(producer_pass) = self
                    .passes
                    .used_indices()
                    .find(|&p| self.passes.entry(p).outputs.iter().any(|out| out == input))
                else {
                    // externally provided attachment
                    continue;
                };

                let producer_node = match self.nodes.find(producer_pass) {
                    Some(node) => node,
                    None => {
                        let node = self.nodes.add(producer_pass)?;
                        worklist.push(node);
                        node
                    }
                };

                // a self-produced input shows up as a self-edge and is
                // rejected by the scheduler
                self.matrix.set_edge(consumer_node, producer_node);

                match self.registry.lookup(input) {
                    Some(attachment) => {
                        barriers.insert(input.clone(), attachment.kind);
                    }
                    None => {
                        log::warn!(
                            "attachment '{}' crossed a pass boundary but is not registered",
                            input
                        )
                    }
                }
            }
        }

        Ok(barriers)
    }
}
