// SPDX-License-Identifier: MIT

//! Model-backed agent nodes

use serde::Deserialize;
use serde_json::Value;

use super::{NodeOutcome, NodeServices};
use crate::adk::error::FlowError;
use crate::adk::model::{ChatMessage, GenerateRequest, GenerationConfig};
use crate::flowkit::tools::Toolbox;
use crate::flowkit::workflow::context::{value_to_prompt, ExecutionContext, Resources};
use crate::flowkit::workflow::graph::Node;
use crate::flowkit::workflow::orchestrator::ToolCallingOrchestrator;
use crate::flowkit::workflow::template;

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AgentConfig {
    instructions: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    #[serde(alias = "includeChatHistory")]
    include_history: bool,
    use_tools: bool,
    reasoning_effort: Option<String>,
}

pub(super) async fn run(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    let config: AgentConfig = node.config_as()?;

    let model = config
        .model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| services.config.default_model.clone())
        .ok_or_else(|| {
            FlowError::config(format!("Agent node '{}' has no model configured", node.id))
        })?;

    if let Some(effort) = &config.reasoning_effort {
        log::debug!("Agent '{}' reasoningEffort={} is not forwarded", node.id, effort);
    }

    let instructions = config
        .instructions
        .filter(|i| !i.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());
    let mut system = template::render(&instructions, ctx);
    system.push_str(&resource_brief(&ctx.resources));

    let user = value_to_prompt(&ctx.current_value);
    let generation = GenerationConfig {
        temperature: Some(
            config
                .temperature
                .unwrap_or(services.config.default_temperature),
        ),
        max_output_tokens: config.max_tokens,
        ..Default::default()
    };
    let with_history = config.include_history && !ctx.history.is_empty();

    log::info!("Calling model {} for agent '{}'", model, node.id);
    let provider = services.provider.as_ref();

    let reply = if config.use_tools || !ctx.resources.is_empty() {
        let toolbox = Toolbox::for_agent(&services.tools, &ctx.resources).await;
        let messages = conversation(&system, with_history.then_some(&ctx.history[..]), &user);
        let round = ToolCallingOrchestrator::new(provider, &toolbox, toolbox.manifest())
            .run(&model, messages, &generation)
            .await?;
        round.answer
    } else if with_history {
        let messages = conversation(&system, Some(&ctx.history[..]), &user);
        provider.chat(&model, &messages, Some(&generation)).await?
    } else {
        provider
            .generate(
                &model,
                GenerateRequest {
                    prompt: user.clone(),
                    system: Some(system),
                    config: generation,
                },
            )
            .await?
    };

    if config.include_history {
        ctx.history.push(ChatMessage::user(user));
        ctx.history.push(ChatMessage::assistant(reply.clone()));
    }

    Ok(NodeOutcome::value(Value::String(reply)))
}

fn conversation(system: &str, history: Option<&[ChatMessage]>, user: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(history.unwrap_or_default().iter().cloned());
    messages.push(ChatMessage::user(user));
    messages
}

/// Tell the model what its attached resources are
fn resource_brief(resources: &Resources) -> String {
    let mut brief = String::new();
    if !resources.documents.is_empty() {
        brief.push_str("\n\nYou can search these documents with the search_knowledge_base tool:");
        for doc in &resources.documents {
            brief.push_str(&format!("\n- {}", doc.name));
        }
    }
    if !resources.data_sources.is_empty() {
        brief.push_str("\n\nYou can query these databases with the query_database tool:");
        for source in &resources.data_sources {
            brief.push_str(&format!("\n- {} ({})", source.name, source.db_type));
            if let Some(schema) = source.schema.as_deref().filter(|s| !s.is_empty()) {
                brief.push_str(&format!("\n  Schema: {}", schema));
            }
            if let Some(context) = source.query_context.as_deref().filter(|s| !s.is_empty()) {
                brief.push_str(&format!("\n  Notes: {}", context));
            }
        }
    }
    brief
}
