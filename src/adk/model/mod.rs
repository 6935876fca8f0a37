// SPDX-License-Identifier: MIT

//! Model module - defines the LLM provider trait and implementations
//!
//! This module provides the core `LlmProvider` trait and the message types
//! shared by every provider. Implementations live in their own submodules:
//! - [ollama] - a local Ollama server

pub mod ollama;

use crate::adk::error::FlowError;
use crate::adk::tool::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls carried by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Name of the tool a `Role::Tool` message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The assistant turn that requested `tool_calls`
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// The textual result of a tool, fed back to the model
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

/// Response of a tool-capable chat call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Reasoning text from thinking models, when the provider exposes it
    #[serde(default)]
    pub thinking: Option<String>,
}

/// A single-prompt completion request
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub config: GenerationConfig,
}

/// A model installed on the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Core trait for LLM provider implementations
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-turn completion with an optional system prompt
    async fn generate(&self, model: &str, request: GenerateRequest) -> Result<String, FlowError>;

    /// Multi-turn chat completion
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        config: Option<&GenerationConfig>,
    ) -> Result<String, FlowError>;

    /// Chat completion that may answer with tool calls instead of text
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        config: Option<&GenerationConfig>,
    ) -> Result<ChatResponse, FlowError>;

    /// Models available on this provider
    async fn list_models(&self) -> Result<Vec<ModelInfo>, FlowError> {
        Ok(Vec::new())
    }
}
