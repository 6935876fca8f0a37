// SPDX-License-Identifier: MIT

//! Per-run execution log and observer hooks

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::flowkit::workflow::graph::{Node, NodeKind};

/// One executed node
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub node_type: NodeKind,
    pub node_name: String,
    /// Current value before the node ran
    pub input: Value,
    /// Current value after the node ran
    pub output: Value,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handle taken by a conditional or loop (`true`, `false`, `exit`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl ExecutionLogEntry {
    pub fn new(node: &Node, input: Value, output: Value, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id: node.id.clone(),
            node_type: node.kind,
            node_name: node.name(),
            input,
            output,
            duration_ms: duration.as_millis().try_into().unwrap_or(u64::MAX),
            error: None,
            branch: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Lifecycle of a node as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Running,
    Completed,
    Failed,
}

/// Receives log entries and node state changes as they happen
///
/// Callbacks run inline on the executing task and must not block.
pub trait ExecutionObserver: Send + Sync {
    fn on_log(&self, entry: &ExecutionLogEntry);

    fn on_node_state_change(&self, _node_id: &str, _state: NodeState) {}
}

impl<F> ExecutionObserver for F
where
    F: Fn(&ExecutionLogEntry) + Send + Sync,
{
    fn on_log(&self, entry: &ExecutionLogEntry) {
        self(entry)
    }
}

/// Ordered log of one run
#[derive(Default)]
pub struct ExecutionLogger {
    entries: Vec<ExecutionLogEntry>,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl ExecutionLogger {
    pub fn new(observer: Option<Arc<dyn ExecutionObserver>>) -> Self {
        Self {
            entries: Vec::new(),
            observer,
        }
    }

    /// Append an entry and forward it to the observer
    pub fn record(&mut self, entry: ExecutionLogEntry) {
        log::debug!(
            "[{}] {} ({}) finished in {}ms",
            entry.node_id,
            entry.node_name,
            entry.node_type,
            entry.duration_ms
        );
        if let Some(observer) = &self.observer {
            observer.on_log(&entry);
        }
        self.entries.push(entry);
    }

    pub fn node_state(&self, node_id: &str, state: NodeState) {
        if let Some(observer) = &self.observer {
            observer.on_node_state_change(node_id, state);
        }
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ExecutionLogEntry> {
        self.entries
    }
}
