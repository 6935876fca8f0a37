// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Values come from an optional YAML file, then environment variables
//! override them. Every field has a default so an empty file is valid.

use crate::adk::error::FlowError;
use crate::adk::model::ollama::DEFAULT_OLLAMA_URL;
use crate::flowkit::collaborators::McpServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Runtime configuration for the workflow engine and its collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the Ollama server
    pub ollama_url: String,
    /// Model used by agent nodes that do not name one
    pub default_model: Option<String>,
    /// Sampling temperature for agent nodes that do not set one
    pub default_temperature: f32,
    /// Iteration cap for loop nodes without `maxIterations`
    pub max_loop_iterations: u32,
    /// Upper bound on node executions per run; trips on cycles without a loop node
    pub max_steps: usize,
    /// Timeout applied to every provider request
    pub request_timeout_secs: u64,
    /// Text-to-speech server; voice nodes pass through when unset
    pub tts_url: Option<String>,
    /// MCP servers that toolCall nodes may refer to by name
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: None,
            default_temperature: 0.7,
            max_loop_iterations: 100,
            max_steps: 1000,
            request_timeout_secs: 120,
            tts_url: None,
            mcp_servers: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, FlowError> {
        let mut config = match path {
            Some(p) => Self::from_yaml(&fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml(content: &str) -> Result<Self, FlowError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `OLLAMA_BASE_URL`, `FLOWKIT_DEFAULT_MODEL`, `FLOWKIT_REQUEST_TIMEOUT`
    /// and `FLOWKIT_TTS_URL`
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL").filter(|v| !v.is_empty()) {
            self.ollama_url = url;
        }
        if let Some(model) = lookup("FLOWKIT_DEFAULT_MODEL").filter(|v| !v.is_empty()) {
            self.default_model = Some(model);
        }
        if let Some(timeout) = lookup("FLOWKIT_REQUEST_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid FLOWKIT_REQUEST_TIMEOUT: {}", timeout),
            }
        }
        if let Some(url) = lookup("FLOWKIT_TTS_URL").filter(|v| !v.is_empty()) {
            self.tts_url = Some(url);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
