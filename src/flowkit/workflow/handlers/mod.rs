// SPDX-License-Identifier: MIT

//! Per-kind node behavior
//!
//! Each handler reads the execution context, may call a collaborator and
//! returns a [`NodeOutcome`]. Routing is left to the executor; handlers only
//! report which branch a conditional took and whether the run should stop.

mod agent;
mod control;
mod data;
mod external;

pub use control::LoopSettings;

use serde_json::Value;
use std::sync::Arc;

use crate::adk::error::FlowError;
use crate::adk::model::LlmProvider;
use crate::flowkit::collaborators::Collaborators;
use crate::flowkit::config::EngineConfig;
use crate::flowkit::workflow::context::ExecutionContext;
use crate::flowkit::workflow::expression::Evaluator;
use crate::flowkit::workflow::graph::{Node, NodeKind};
use crate::flowkit::workflow::registry::ToolRegistry;

/// What handlers may call during a run
#[derive(Clone)]
pub struct NodeServices {
    pub provider: Arc<dyn LlmProvider>,
    pub evaluator: Arc<dyn Evaluator>,
    pub tools: ToolRegistry,
    pub collaborators: Collaborators,
    pub config: EngineConfig,
}

/// Result of running one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    /// The new current value
    pub value: Value,
    /// Verdict of a conditional node
    pub branch: Option<bool>,
    /// Stop the run with `value` as its result
    pub halt: bool,
}

impl NodeOutcome {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            branch: None,
            halt: false,
        }
    }

    pub fn branch(value: Value, branch: bool) -> Self {
        Self {
            branch: Some(branch),
            ..Self::value(value)
        }
    }

    pub fn halt(value: Value) -> Self {
        Self {
            halt: true,
            ..Self::value(value)
        }
    }
}

/// Run the handler for `node.kind`
pub async fn dispatch(
    node: &Node,
    ctx: &mut ExecutionContext,
    services: &NodeServices,
) -> Result<NodeOutcome, FlowError> {
    match node.kind {
        // Loop iteration is driven by the executor's frame stack
        NodeKind::Start | NodeKind::End | NodeKind::Loop => Ok(passthrough(ctx)),
        NodeKind::Note
        | NodeKind::KnowledgeBase
        | NodeKind::Database
        | NodeKind::FileSearch
        | NodeKind::ExternalInput
        | NodeKind::ExternalOutput => Ok(passthrough(ctx)),
        NodeKind::Transform => data::transform(node, ctx, services.evaluator.as_ref()),
        NodeKind::SetState => data::set_state(node, ctx, services.evaluator.as_ref()),
        NodeKind::PromptInject => data::prompt_inject(node, ctx),
        NodeKind::Conditional => control::conditional(node, ctx, services.evaluator.as_ref()),
        NodeKind::Agent => agent::run(node, ctx, services).await,
        NodeKind::Guardrail => external::guardrail(node, ctx, services).await,
        NodeKind::ToolCall => external::tool_call(node, ctx, services).await,
        NodeKind::Approval => external::approval(node, ctx, services).await,
        NodeKind::VoiceOutput => external::voice(node, ctx, services).await,
    }
}

fn passthrough(ctx: &ExecutionContext) -> NodeOutcome {
    NodeOutcome::value(ctx.current_value.clone())
}
