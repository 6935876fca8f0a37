// SPDX-License-Identifier: MIT

//! External collaborators used by guardrail, approval, voice and tool-call nodes
//!
//! Each collaborator is optional. When one is missing the node passes its
//! value through, and when one fails the failure is logged and the node
//! passes through as well.

pub mod approval;
pub mod guardrail;
pub mod speech;

pub use approval::ConsoleApproval;
pub use guardrail::RulesContentFilter;
pub use speech::HttpSpeechSynthesizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::FlowError;

/// Content submitted to a guardrail
#[derive(Debug, Clone)]
pub struct GuardrailRequest {
    pub node_id: String,
    pub input: Value,
    pub state: Value,
    /// The node's rules snippet, if any
    pub rules: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    Block { reason: Option<String> },
}

#[async_trait]
pub trait ContentFilter: Send + Sync {
    async fn check(&self, request: &GuardrailRequest) -> Result<Verdict, FlowError>;
}

/// A pause for human sign-off
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub node_id: String,
    pub message: String,
    pub value: Value,
    /// How long to wait for an answer; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: Option<String> },
}

#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, FlowError>;
}

/// Text to speak
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    /// Signed percentage relative to normal speed, e.g. `+50%`
    pub rate: String,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutput {
    pub bytes: usize,
    pub path: Option<PathBuf>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechOutput, FlowError>;
}

/// How to launch an MCP server over stdio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Call `tool` on `server` and return its text output
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, FlowError>;
}

/// The optional collaborators available to a run
#[derive(Clone, Default)]
pub struct Collaborators {
    pub content_filter: Option<Arc<dyn ContentFilter>>,
    pub approvals: Option<Arc<dyn ApprovalChannel>>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub mcp: Option<Arc<dyn McpConnector>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_filter(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.content_filter = Some(filter);
        self
    }

    pub fn with_approvals(mut self, channel: Arc<dyn ApprovalChannel>) -> Self {
        self.approvals = Some(channel);
        self
    }

    pub fn with_speech(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(synthesizer);
        self
    }

    pub fn with_mcp(mut self, connector: Arc<dyn McpConnector>) -> Self {
        self.mcp = Some(connector);
        self
    }
}

/// Convert a speed multiplier to a signed-percent rate (`1.5` → `+50%`)
pub fn speed_to_rate(speed: f64) -> String {
    let percent = ((speed - 1.0) * 100.0).round() as i64;
    if percent >= 0 {
        format!("+{}%", percent)
    } else {
        format!("{}%", percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_speed_to_rate() {
        assert_eq!(speed_to_rate(1.0), "+0%");
        assert_eq!(speed_to_rate(1.5), "+50%");
        assert_eq!(speed_to_rate(0.75), "-25%");
    }

    #[test]
    fn test_mcp_server_config() {
        let config: McpServerConfig = serde_json::from_value(json!({
            "name": "everything",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-everything"]
        }))
        .unwrap();
        assert_eq!(config.args.len(), 2);
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_builder() {
        let collaborators = Collaborators::new();
        assert!(collaborators.content_filter.is_none());
        assert!(collaborators.mcp.is_none());
    }
}
