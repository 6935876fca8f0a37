// SPDX-License-Identifier: MIT

//! Workflow loader - graph file loading and parsing
//!
//! Graphs are stored as the editor's JSON export or as YAML. The format is
//! picked from the file extension; unknown extensions are tried as JSON
//! first, then YAML.

use super::graph::Graph;
use crate::adk::error::FlowError;
use std::fs;
use std::path::Path;

/// Loads workflow graphs from JSON or YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a graph from a file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<Graph, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FlowError::config(format!("Cannot read workflow {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let graph = match extension.as_deref() {
            Some("json") => Self::parse_json(&content)?,
            Some("yaml") | Some("yml") => Self::parse_yaml(&content)?,
            _ => Self::parse_json(&content).or_else(|_| Self::parse_yaml(&content))?,
        };

        log::debug!(
            "Loaded workflow {} ({} nodes, {} edges)",
            path.display(),
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    /// Parse a graph from a JSON string
    pub fn parse_json(content: &str) -> Result<Graph, FlowError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a graph from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Graph, FlowError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a graph file with the default loader
pub fn load_graph<P: AsRef<Path>>(path: P) -> Result<Graph, FlowError> {
    WorkflowLoader::new().load_workflow(path)
}
