// SPDX-License-Identifier: MIT

//! Conditional verdicts and loop checks

use serde::Deserialize;
use serde_json::Value;

use super::NodeOutcome;
use crate::adk::error::FlowError;
use crate::flowkit::workflow::context::{value_to_prompt, ExecutionContext};
use crate::flowkit::workflow::expression::{is_truthy, Evaluator};
use crate::flowkit::workflow::graph::Node;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionalConfig {
    condition: Option<String>,
}

/// The value is untouched; only the branch is reported
pub(super) fn conditional(
    node: &Node,
    ctx: &mut ExecutionContext,
    evaluator: &dyn Evaluator,
) -> Result<NodeOutcome, FlowError> {
    let config: ConditionalConfig = node.config_as()?;
    let input = ctx.current_value.clone();

    let verdict = match config.condition.filter(|c| !c.trim().is_empty()) {
        None => default_truthiness(&input),
        Some(condition) => match evaluator.run(&condition, &ctx.bindings()) {
            Ok(value) => is_truthy(&value),
            Err(e) => {
                log::warn!(
                    "Condition of '{}' failed, taking the false branch: {}",
                    node.id,
                    e
                );
                false
            }
        },
    };

    log::info!("Conditional '{}' -> {}", node.id, verdict);
    Ok(NodeOutcome::branch(input, verdict))
}

/// Truthiness of an input with no condition: `""`, `"false"` and `"0"` are falsy
fn default_truthiness(input: &Value) -> bool {
    let text = value_to_prompt(input);
    is_truthy(input) && text != "false" && text != "0"
}

/// Condition and iteration cap of a loop node
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub condition: Option<String>,
    pub max_iterations: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LoopConfig {
    condition: Option<String>,
    max_iterations: Option<u32>,
}

impl LoopSettings {
    /// Read the node's config; `default_max` applies when no positive cap is set
    pub fn from_node(node: &Node, default_max: u32) -> Result<Self, FlowError> {
        let config: LoopConfig = node.config_as()?;
        Ok(Self {
            condition: config.condition.filter(|c| !c.trim().is_empty()),
            max_iterations: config
                .max_iterations
                .filter(|m| *m > 0)
                .unwrap_or(default_max),
        })
    }

    /// Evaluate the loop condition; a loop without one never iterates
    pub fn should_continue(
        &self,
        ctx: &ExecutionContext,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, FlowError> {
        match &self.condition {
            None => Ok(false),
            Some(condition) => evaluator
                .run(condition, &ctx.bindings())
                .map(|v| is_truthy(&v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::flowkit::workflow::expression::ExpressionEvaluator;
    use crate::flowkit::workflow::graph::NodeKind;
    use serde_json::json;

    const EVAL: ExpressionEvaluator = ExpressionEvaluator;

    fn branch(config: Value, input: Value) -> NodeOutcome {
        let node = Node::new("if1", NodeKind::Conditional, config);
        conditional(&node, &mut context(input), &EVAL).unwrap()
    }

    #[test]
    fn test_condition_keeps_value() {
        let outcome = branch(json!({"condition": "return input.length > 2"}), json!("abc"));
        assert_eq!(outcome, NodeOutcome::branch(json!("abc"), true));

        let outcome = branch(json!({"condition": "return input.length > 2"}), json!("ab"));
        assert_eq!(outcome.branch, Some(false));
        assert_eq!(outcome.value, json!("ab"));
    }

    #[test]
    fn test_default_truthiness() {
        for (input, expected) in [
            (json!("yes"), true),
            (json!(""), false),
            (json!("false"), false),
            (json!("0"), false),
            (json!(0), false),
            (json!(null), false),
            (json!({"a": 1}), true),
        ] {
            assert_eq!(branch(json!({}), input.clone()).branch, Some(expected), "{}", input);
        }
    }

    #[test]
    fn test_condition_error_is_false() {
        let outcome = branch(json!({"condition": "return nope("}), json!("abc"));
        assert_eq!(outcome.branch, Some(false));
    }

    #[test]
    fn test_loop_settings() {
        let node = Node::new(
            "w",
            NodeKind::Loop,
            json!({"condition": "return state.n < 2", "maxIterations": 10}),
        );
        let settings = LoopSettings::from_node(&node, 100).unwrap();
        assert_eq!(settings.max_iterations, 10);

        let mut ctx = context(json!(null));
        ctx.state.update("n", json!(0));
        assert!(settings.should_continue(&ctx, &EVAL).unwrap());
        ctx.state.update("n", json!(2));
        assert!(!settings.should_continue(&ctx, &EVAL).unwrap());
    }

    #[test]
    fn test_loop_defaults() {
        let node = Node::new("w", NodeKind::Loop, json!({"maxIterations": 0}));
        let settings = LoopSettings::from_node(&node, 7).unwrap();
        assert_eq!(settings.max_iterations, 7);
        assert!(!settings
            .should_continue(&context(json!(1)), &EVAL)
            .unwrap());
    }

    #[test]
    fn test_loop_condition_error() {
        let node = Node::new("w", NodeKind::Loop, json!({"condition": "return ghost > 1"}));
        let settings = LoopSettings::from_node(&node, 5).unwrap();
        assert!(settings.should_continue(&context(json!(1)), &EVAL).is_err());
    }
}
