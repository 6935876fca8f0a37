// SPDX-License-Identifier: MIT

//! Rule-snippet content filter

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{ContentFilter, GuardrailRequest, Verdict};
use crate::adk::error::FlowError;
use crate::flowkit::workflow::expression::{is_truthy, Bindings, Evaluator, ExpressionEvaluator};

/// Evaluates the guardrail node's `rules` snippet with `input` and `state`
///
/// A truthy result allows the content. `false`/`null` blocks it, and a
/// string result blocks it with that string as the reason. Nodes without
/// rules always allow.
pub struct RulesContentFilter {
    evaluator: Arc<dyn Evaluator>,
}

impl RulesContentFilter {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl Default for RulesContentFilter {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator))
    }
}

#[async_trait]
impl ContentFilter for RulesContentFilter {
    async fn check(&self, request: &GuardrailRequest) -> Result<Verdict, FlowError> {
        let Some(rules) = request.rules.as_deref().filter(|r| !r.trim().is_empty()) else {
            return Ok(Verdict::Allow);
        };

        let bindings = Bindings::new()
            .with("input", request.input.clone())
            .with("state", request.state.clone());

        Ok(match self.evaluator.run(rules, &bindings)? {
            Value::String(reason) if !reason.is_empty() => Verdict::Block {
                reason: Some(reason),
            },
            verdict if is_truthy(&verdict) => Verdict::Allow,
            _ => Verdict::Block { reason: None },
        })
    }
}
