// SPDX-License-Identifier: MIT

//! Nodes backed by optional collaborators: guardrail, toolCall, approval
//! and voiceOutput
//!
//! A missing collaborator or a failing one never aborts the run; the node
//! passes its value through and the failure is logged. So does a node whose
//! configuration cannot be read.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use super::{passthrough, NodeOutcome, NodeServices};
use crate::adk::error::FlowError;
use crate::flowkit::collaborators::{
    speed_to_rate, ApprovalDecision, ApprovalRequest, GuardrailRequest, McpServerConfig,
    SpeechRequest, Verdict,
};
use crate::flowkit::workflow::context::{value_to_prompt, ExecutionContext};
use crate::flowkit::workflow::graph::Node;
use crate::flowkit::workflow::template;

const DEFAULT_BLOCK_MESSAGE: &str = "Content blocked by guardrail";
const DEFAULT_APPROVAL_MESSAGE: &str = "Approve this step to continue?";
const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_VOICE: &str = "en-US-GuyNeural";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GuardrailConfig {
    rules: Option<String>,
    error_message: Option<String>,
}

/// An inline launch config, or the name of one from `EngineConfig::mcp_servers`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerRef {
    Named(String),
    Inline(McpServerConfig),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ToolCallConfig {
    #[serde(alias = "serverName")]
    server: Option<ServerRef>,
    #[serde(alias = "toolName", alias = "operation")]
    tool: Option<String>,
    #[serde(alias = "config")]
    arguments: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApprovalConfig {
    #[serde(alias = "message")]
    approval_message: Option<String>,
    /// Seconds to wait; 0 waits indefinitely
    timeout: Option<u64>,
}

impl ApprovalConfig {
    fn wait(&self) -> Option<Duration> {
        match self.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS)),
        }
    }
}

/// Node config, or `None` with a warning when it does not parse
fn lenient_config<T: DeserializeOwned>(node: &Node) -> Option<T> {
    match node.config_as() {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("{}, passing through", e);
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VoiceConfig {
    voice_name: Option<String>,
    speed: Option<f64>,
    output_file: Option<PathBuf>,
}

pub(super) async fn guardrail(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    let Some(filter) = &services.collaborators.content_filter else {
        log::debug!("No content filter configured, '{}' passes through", node.id);
        return Ok(passthrough(ctx));
    };
    let Some(config) = lenient_config::<GuardrailConfig>(node) else {
        return Ok(passthrough(ctx));
    };

    let request = GuardrailRequest {
        node_id: node.id.clone(),
        input: ctx.current_value.clone(),
        state: ctx.state.to_json(),
        rules: config.rules,
    };

    match filter.check(&request).await {
        Ok(Verdict::Allow) => Ok(passthrough(ctx)),
        Ok(Verdict::Block { reason }) => {
            log::warn!(
                "Guardrail '{}' blocked the run: {}",
                node.id,
                reason.as_deref().unwrap_or("no reason given")
            );
            let message = config
                .error_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_string());
            Ok(NodeOutcome::halt(Value::String(message)))
        }
        Err(e) => {
            log::warn!("Guardrail '{}' failed, passing through: {}", node.id, e);
            Ok(passthrough(ctx))
        }
    }
}

pub(super) async fn tool_call(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    let Some(connector) = &services.collaborators.mcp else {
        log::debug!("No MCP connector configured, '{}' passes through", node.id);
        return Ok(passthrough(ctx));
    };
    let Some(config) = lenient_config::<ToolCallConfig>(node) else {
        return Ok(passthrough(ctx));
    };
    let (Some(server), Some(tool)) = (config.server, config.tool.filter(|t| !t.is_empty())) else {
        log::warn!("Tool call '{}' needs both server and tool, passing through", node.id);
        return Ok(passthrough(ctx));
    };
    let server = match server {
        ServerRef::Inline(server) => server,
        ServerRef::Named(name) => match services.config.mcp_servers.get(&name) {
            Some(server) => server.clone(),
            None => {
                log::warn!(
                    "Tool call '{}' names unknown MCP server '{}', passing through",
                    node.id,
                    name
                );
                return Ok(passthrough(ctx));
            }
        },
    };

    let arguments = config
        .arguments
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, Value::String(template::render(&s, &*ctx))),
            other => (k, other),
        })
        .collect();

    log::info!("Calling MCP tool {}/{}", server.name, tool);
    match connector.call_tool(&server, &tool, arguments).await {
        Ok(text) => Ok(NodeOutcome::value(Value::String(text))),
        Err(e) => {
            log::warn!("MCP tool {}/{} failed, passing through: {}", server.name, tool, e);
            Ok(passthrough(ctx))
        }
    }
}

pub(super) async fn approval(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    let Some(channel) = &services.collaborators.approvals else {
        log::info!("No approval channel configured, auto-approving '{}'", node.id);
        return Ok(passthrough(ctx));
    };
    let Some(config) = lenient_config::<ApprovalConfig>(node) else {
        return Ok(passthrough(ctx));
    };

    let timeout = config.wait();
    let request = ApprovalRequest {
        node_id: node.id.clone(),
        message: config
            .approval_message
            .map(|m| template::render(&m, &*ctx))
            .unwrap_or_else(|| DEFAULT_APPROVAL_MESSAGE.to_string()),
        value: ctx.current_value.clone(),
        timeout,
    };

    match channel.request(&request).await {
        Ok(ApprovalDecision::Approved) => Ok(passthrough(ctx)),
        Ok(ApprovalDecision::Rejected { reason }) => {
            log::info!(
                "Approval '{}' rejected{}",
                node.id,
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            );
            Ok(NodeOutcome::halt(ctx.current_value.clone()))
        }
        Err(e) => {
            log::warn!("Approval '{}' failed, passing through: {}", node.id, e);
            Ok(passthrough(ctx))
        }
    }
}

pub(super) async fn voice(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    let Some(speech) = &services.collaborators.speech else {
        log::debug!("No speech synthesizer configured, '{}' passes through", node.id);
        return Ok(passthrough(ctx));
    };
    let Some(config) = lenient_config::<VoiceConfig>(node) else {
        return Ok(passthrough(ctx));
    };

    let request = SpeechRequest {
        text: value_to_prompt(&ctx.current_value),
        voice: config
            .voice_name
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        rate: speed_to_rate(config.speed.filter(|s| *s > 0.0).unwrap_or(1.0)),
        output_file: config.output_file,
    };

    match speech.synthesize(&request).await {
        Ok(output) => log::info!(
            "Synthesized {} bytes of speech for '{}'{}",
            output.bytes,
            node.id,
            output
                .path
                .map(|p| format!(" -> {}", p.display()))
                .unwrap_or_default()
        ),
        Err(e) => log::warn!("Speech for '{}' failed, skipping: {}", node.id, e),
    }
    Ok(passthrough(ctx))
}
