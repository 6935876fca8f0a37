// SPDX-License-Identifier: MIT

//! Typed error handling for flowkit-rs
//!
//! `FlowError` follows the engine's failure taxonomy: configuration and
//! provider failures abort a run, evaluation failures abort it only when
//! they come from a transform, and tool or loop-cap failures never do.

use thiserror::Error;

/// Top-level error type for flowkit-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// The graph or a node is misconfigured (no start node, agent without a model, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A transform/condition snippet could not be parsed or evaluated
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A dispatched tool failed
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The LLM provider call failed or returned an error
    #[error("Provider error from {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A loop reached its iteration cap
    #[error("Loop reached max iterations: {limit}")]
    LoopSafety { limit: u32 },

    /// A node id referenced at runtime does not exist
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// The run was cancelled between two node executions
    #[error("Execution cancelled")]
    Cancelled,

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl FlowError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an evaluation error
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the run when raised by a node handler
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ToolExecution { .. } | Self::LoopSafety { .. })
    }
}
