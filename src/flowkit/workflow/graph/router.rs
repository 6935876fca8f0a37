// SPDX-License-Identifier: MIT

//! Successor selection from a node's outgoing edges

use super::types::{handles, Edge, Graph, Node, NodeKind};

/// Picks the next node after a node completes
pub struct Router<'g> {
    graph: &'g Graph,
}

impl<'g> Router<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Next node to run after `node`; `branch` is the conditional verdict
    ///
    /// Conditionals follow the edge tagged with their branch, loops follow
    /// their exit, everything else follows the first sequential edge.
    pub fn next(&self, node: &Node, branch: Option<bool>) -> Option<&'g str> {
        match node.kind {
            NodeKind::Conditional => {
                let handle = if branch.unwrap_or(false) {
                    handles::TRUE
                } else {
                    handles::FALSE
                };
                self.tagged(&node.id, handle)
            }
            NodeKind::Loop => self.loop_exit(node),
            _ => self.sequential(&node.id),
        }
    }

    /// Entry of a loop's body
    pub fn loop_body(&self, node: &Node) -> Option<&'g str> {
        self.tagged(&node.id, handles::BODY)
    }

    /// Where control goes when a loop finishes: the `exit` edge, else any
    /// edge that is not the body
    pub fn loop_exit(&self, node: &Node) -> Option<&'g str> {
        self.tagged(&node.id, handles::EXIT).or_else(|| {
            self.edges_from(&node.id)
                .find(|e| {
                    e.handle()
                        .map_or(true, |h| h != handles::BODY && !handles::is_resource(h))
                })
                .map(|e| e.target.as_str())
        })
    }

    fn edges_from<'a>(&self, id: &'a str) -> impl Iterator<Item = &'g Edge> + 'a
    where
        'g: 'a,
    {
        self.graph.edges.iter().filter(move |e| e.source == id)
    }

    fn tagged(&self, id: &str, handle: &str) -> Option<&'g str> {
        self.edges_from(id)
            .find(|e| e.handle() == Some(handle))
            .map(|e| e.target.as_str())
    }

    fn sequential(&self, id: &str) -> Option<&'g str> {
        let candidates: Vec<&'g Edge> = self.edges_from(id).filter(|e| e.is_sequential()).collect();
        if candidates.len() > 1 {
            log::warn!(
                "Node '{}' has {} outgoing edges; following only '{}'",
                id,
                candidates.len(),
                candidates[0].target
            );
        }
        candidates.first().map(|e| e.target.as_str())
    }
}
