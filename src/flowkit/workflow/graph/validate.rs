// SPDX-License-Identifier: MIT

//! Structural checks run before a graph executes

use std::collections::HashSet;

use super::types::{handles, Graph, NodeKind};
use crate::adk::error::FlowError;

impl Graph {
    /// Reject graphs the driver cannot run unambiguously
    ///
    /// Checks: exactly one start node, unique node ids, edges between
    /// existing nodes, and at most one edge per conditional branch or loop
    /// port.
    pub fn validate(&self) -> Result<(), FlowError> {
        let starts = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        match starts {
            0 => return Err(FlowError::config("No start node found in workflow")),
            1 => {}
            n => {
                return Err(FlowError::config(format!(
                    "Workflow has {} start nodes; exactly one is required",
                    n
                )))
            }
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(FlowError::config(format!("Duplicate node id '{}'", node.id)));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(FlowError::config(format!(
                        "Edge '{}' references unknown node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
        }

        for node in &self.nodes {
            let ports: &[&str] = match node.kind {
                NodeKind::Conditional => &[handles::TRUE, handles::FALSE],
                NodeKind::Loop => &[handles::BODY, handles::EXIT],
                _ => continue,
            };
            for port in ports {
                let count = self
                    .outgoing(&node.id)
                    .filter(|e| e.handle() == Some(*port))
                    .count();
                if count > 1 {
                    return Err(FlowError::config(format!(
                        "{} node '{}' has {} '{}' edges; at most one is allowed",
                        node.kind, node.id, count, port
                    )));
                }
            }
        }

        Ok(())
    }
}
