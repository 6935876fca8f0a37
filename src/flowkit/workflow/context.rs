// SPDX-License-Identifier: MIT

//! Mutable context threaded through one workflow run

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adk::model::ChatMessage;
use crate::flowkit::workflow::expression::Bindings;
use crate::flowkit::workflow::state::WorkflowState;

/// Maximum passages returned by knowledge search when no node sets one
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Everything a node can read or write during a run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Values written by `setState` nodes
    pub state: WorkflowState,
    /// Conversation shared by agents with history enabled
    pub history: Vec<ChatMessage>,
    /// Output of the most recent node
    pub current_value: Value,
    /// Workflow-level inputs, read-only for snippets
    pub variables: Map<String, Value>,
    /// Documents and data sources of the agent currently running
    pub resources: Resources,
}

impl ExecutionContext {
    pub fn new(input: Value, state: WorkflowState, variables: Map<String, Value>) -> Self {
        Self {
            state,
            history: Vec::new(),
            current_value: input,
            variables,
            resources: Resources::default(),
        }
    }

    /// Snippet bindings: `input`, `state` and `variables`
    pub fn bindings(&self) -> Bindings {
        Bindings::new()
            .with("input", self.current_value.clone())
            .with("state", self.state.to_json())
            .with("variables", Value::Object(self.variables.clone()))
    }

    /// Serializable view for logs and API responses
    pub fn snapshot(&self) -> Value {
        json!({
            "currentValue": self.current_value,
            "state": self.state.to_json(),
            "variables": self.variables,
            "history": self.history,
        })
    }
}

/// Resources wired into an agent node
#[derive(Debug, Clone, PartialEq)]
pub struct Resources {
    pub documents: Vec<Document>,
    /// Passages returned per knowledge search
    pub max_results: usize,
    pub data_sources: Vec<DataSource>,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            data_sources: Vec::new(),
        }
    }
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.data_sources.is_empty()
    }
}

/// A document held by a knowledge-base node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Connection details held by a database node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_db_type")]
    pub db_type: String,
    #[serde(default)]
    pub connection_string: String,
    /// Human-readable schema description shown to the model
    #[serde(default)]
    pub schema: Option<String>,
    /// Extra guidance on how the data should be queried
    #[serde(default)]
    pub query_context: Option<String>,
}

fn default_db_type() -> String {
    "sqlite".to_string()
}

/// Render a value for inclusion in a prompt: strings verbatim, `null` as
/// nothing, everything else as JSON
pub fn value_to_prompt(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Human-readable rendering of a final result
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            // A lone result/answer/response wrapper renders as its content
            if map.len() == 1 {
                if let Some(inner) = map.get("result").or(map.get("answer")).or(map.get("response")) {
                    return value_to_text(inner);
                }
            }
            map.iter()
                .map(|(k, v)| format!("**{}**: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Value::Array(items) => items
            .iter()
            .map(|v| format!("- {}", value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
