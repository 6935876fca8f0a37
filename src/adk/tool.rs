// SPDX-License-Identifier: MIT

use crate::adk::error::FlowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for tools that can be called by agent nodes.
///
/// `name()` and `description()` return `&str` and `schema()` returns `&Value`
/// so implementations can keep them in struct fields or statics without
/// allocating on every manifest build.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a toolbox)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, FlowError>;

    /// The manifest entry advertised to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().clone(),
        }
    }
}

/// A tool as advertised to the model in a tool manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Executes tools by name on behalf of the tool-calling orchestrator
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Run the named tool and return its textual result
    async fn execute_tool(&self, name: &str, args: Value) -> Result<String, FlowError>;
}

/// Render a tool result as the text fed back to the model
pub fn result_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}
