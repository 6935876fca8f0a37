// SPDX-License-Identifier: MIT

//! Transform, setState and promptInject nodes

use serde::Deserialize;
use serde_json::Value;

use super::NodeOutcome;
use crate::adk::error::FlowError;
use crate::flowkit::workflow::context::ExecutionContext;
use crate::flowkit::workflow::expression::Evaluator;
use crate::flowkit::workflow::graph::Node;
use crate::flowkit::workflow::template;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransformConfig {
    #[serde(alias = "transformCode")]
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetStateConfig {
    #[serde(alias = "variableName")]
    key: Option<String>,
    value: Option<Value>,
    expression: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PromptInjectConfig {
    #[serde(alias = "promptText")]
    template: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

pub(super) fn transform(
    node: &Node,
    ctx: &mut ExecutionContext,
    evaluator: &dyn Evaluator,
) -> Result<NodeOutcome, FlowError> {
    let config: TransformConfig = node.config_as()?;
    let Some(code) = non_blank(config.code) else {
        return Ok(NodeOutcome::value(ctx.current_value.clone()));
    };

    let bindings = ctx.bindings().with("context", ctx.snapshot());
    let value = evaluator
        .run(&code, &bindings)
        .map_err(|e| annotate(e, format!("transform '{}'", node.id)))?;
    Ok(NodeOutcome::value(value))
}

/// Writes one state key through its reducer; the current value is unchanged
pub(super) fn set_state(
    node: &Node,
    ctx: &mut ExecutionContext,
    evaluator: &dyn Evaluator,
) -> Result<NodeOutcome, FlowError> {
    let config: SetStateConfig = node.config_as()?;
    let Some(key) = non_blank(config.key) else {
        log::warn!("setState node '{}' has no key, skipping", node.id);
        return Ok(NodeOutcome::value(ctx.current_value.clone()));
    };

    // Editor convention: a string value starting with `return` is code
    let expression = non_blank(config.expression).or_else(|| match &config.value {
        Some(Value::String(s)) if s.trim_start().starts_with("return ") => Some(s.clone()),
        _ => None,
    });

    let value = match (expression, config.value) {
        (Some(code), _) => evaluator
            .run(&code, &ctx.bindings())
            .map_err(|e| annotate(e, format!("setState '{}'", node.id)))?,
        (None, Some(value)) if !is_empty_value(&value) => value,
        (None, _) => ctx.current_value.clone(),
    };

    log::debug!("state.{} <- {}", key, value);
    ctx.state.update(&key, value);
    Ok(NodeOutcome::value(ctx.current_value.clone()))
}

/// Prefix an evaluation failure with the node it came from
fn annotate(error: FlowError, origin: String) -> FlowError {
    match error {
        FlowError::Evaluation(message) => {
            FlowError::evaluation(format!("{} failed: {}", origin, message))
        }
        other => other,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub(super) fn prompt_inject(
    node: &Node,
    ctx: &mut ExecutionContext,
) -> Result<NodeOutcome, FlowError> {
    let config: PromptInjectConfig = node.config_as()?;
    let value = match config.template {
        Some(template) => Value::String(template::render(&template, ctx)),
        None => ctx.current_value.clone(),
    };
    Ok(NodeOutcome::value(value))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::flowkit::workflow::expression::ExpressionEvaluator;
    use crate::flowkit::workflow::graph::NodeKind;
    use serde_json::json;

    const EVAL: ExpressionEvaluator = ExpressionEvaluator;

    fn node(kind: NodeKind, config: Value) -> Node {
        Node::new("n1", kind, config)
    }

    #[test]
    fn test_transform_uppercase() {
        let mut ctx = context(json!("hi"));
        let n = node(NodeKind::Transform, json!({"code": "return input.toUpperCase()"}));
        assert_eq!(transform(&n, &mut ctx, &EVAL).unwrap().value, json!("HI"));
    }

    #[test]
    fn test_transform_legacy_key_and_context_binding() {
        let mut ctx = context(json!(2));
        ctx.state.update("factor", json!(10));
        let n = node(
            NodeKind::Transform,
            json!({"transformCode": "return input * context.state.factor;"}),
        );
        assert_eq!(transform(&n, &mut ctx, &EVAL).unwrap().value, json!(20));
    }

    #[test]
    fn test_transform_without_code_passes_through() {
        let mut ctx = context(json!({"keep": true}));
        let n = node(NodeKind::Transform, json!({"code": "   "}));
        assert_eq!(transform(&n, &mut ctx, &EVAL).unwrap().value, json!({"keep": true}));
    }

    #[test]
    fn test_transform_error_is_evaluation() {
        let mut ctx = context(json!("x"));
        let n = node(NodeKind::Transform, json!({"code": "return missing.thing"}));
        let err = transform(&n, &mut ctx, &EVAL).unwrap_err();
        assert!(matches!(err, FlowError::Evaluation(_)));
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Evaluation error: transform 'n1' failed: missing is not defined"
        );
    }

    #[test]
    fn test_set_state_literal_is_idempotent() {
        let mut ctx = context(json!("current"));
        let n = node(NodeKind::SetState, json!({"key": "x", "value": "v"}));

        set_state(&n, &mut ctx, &EVAL).unwrap();
        let outcome = set_state(&n, &mut ctx, &EVAL).unwrap();

        assert_eq!(ctx.state.get("x"), Some(&json!("v")));
        assert_eq!(outcome.value, json!("current"));
    }

    #[test]
    fn test_set_state_defaults_to_current_value() {
        let mut ctx = context(json!("answer"));
        let n = node(NodeKind::SetState, json!({"variableName": "last"}));
        set_state(&n, &mut ctx, &EVAL).unwrap();
        assert_eq!(ctx.state.get("last"), Some(&json!("answer")));
    }

    #[test]
    fn test_set_state_expression_forms() {
        let mut ctx = context(json!(null));
        ctx.state.update("n", json!(0));

        let explicit = node(NodeKind::SetState, json!({"key": "n", "expression": "state.n + 1"}));
        set_state(&explicit, &mut ctx, &EVAL).unwrap();
        assert_eq!(ctx.state.get("n"), Some(&json!(1)));

        let inline = node(NodeKind::SetState, json!({"key": "n", "value": "return state.n + 1;"}));
        set_state(&inline, &mut ctx, &EVAL).unwrap();
        assert_eq!(ctx.state.get("n"), Some(&json!(2)));
    }

    #[test]
    fn test_set_state_without_key_is_noop() {
        let mut ctx = context(json!("v"));
        let n = node(NodeKind::SetState, json!({"value": 3}));
        set_state(&n, &mut ctx, &EVAL).unwrap();
        assert!(ctx.state.is_empty());
    }

    #[test]
    fn test_prompt_inject() {
        let mut ctx = context(json!("rust"));
        ctx.state.update("tone", json!("playful"));
        let n = node(
            NodeKind::PromptInject,
            json!({"promptText": "Write a {state.tone} haiku about {input}{state.unknown}"}),
        );
        assert_eq!(
            prompt_inject(&n, &mut ctx).unwrap().value,
            json!("Write a playful haiku about rust")
        );
    }
}
