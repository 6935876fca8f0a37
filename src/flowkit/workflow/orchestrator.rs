// SPDX-License-Identifier: MIT

//! Tool-calling round for agent nodes
//!
//! The model is asked once with the tool manifest. If it requests tools,
//! each call is dispatched, the results are appended to the conversation
//! and the model is asked once more for a final answer. Tool failures are
//! reported back to the model as text and never abort the node.

use crate::adk::error::FlowError;
use crate::adk::model::{ChatMessage, GenerationConfig, LlmProvider};
use crate::adk::tool::{ToolDefinition, ToolProvider};

/// Prompt appended after tool results to ask for the final answer
pub const FINAL_ANSWER_PROMPT: &str =
    "Using the tool results above, answer the original request.";

/// One agent turn with tool access
pub struct ToolCallingOrchestrator<'a> {
    provider: &'a dyn LlmProvider,
    tools: &'a dyn ToolProvider,
    manifest: Vec<ToolDefinition>,
}

/// The final answer and how many tools were dispatched to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRound {
    pub answer: String,
    pub dispatched: usize,
}

impl<'a> ToolCallingOrchestrator<'a> {
    pub fn new(
        provider: &'a dyn LlmProvider,
        tools: &'a dyn ToolProvider,
        manifest: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            provider,
            tools,
            manifest,
        }
    }

    pub async fn run(
        &self,
        model: &str,
        mut messages: Vec<ChatMessage>,
        config: &GenerationConfig,
    ) -> Result<ToolRound, FlowError> {
        let manifest = (!self.manifest.is_empty()).then_some(self.manifest.as_slice());
        let response = self
            .provider
            .chat_with_tools(model, &messages, manifest, Some(config))
            .await?;

        if let Some(thinking) = response.thinking.as_deref().filter(|t| !t.is_empty()) {
            log::debug!("Model reasoning: {}", thinking);
        }

        if response.tool_calls.is_empty() {
            return Ok(ToolRound {
                answer: response.content,
                dispatched: 0,
            });
        }

        log::info!(
            "Model requested {} tool call(s): {:?}",
            response.tool_calls.len(),
            response
                .tool_calls
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
        );

        messages.push(ChatMessage::assistant_tool_calls(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            let result = match self
                .tools
                .execute_tool(&call.name, call.arguments.clone())
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Tool '{}' failed: {}", call.name, e);
                    format!("Error: {}", e)
                }
            };
            messages.push(ChatMessage::tool_result(&call.name, result));
        }

        messages.push(ChatMessage::user(FINAL_ANSWER_PROMPT));
        let answer = self.provider.chat(model, &messages, Some(config)).await?;

        Ok(ToolRound {
            answer,
            dispatched: response.tool_calls.len(),
        })
    }
}
