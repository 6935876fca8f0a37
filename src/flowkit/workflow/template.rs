// SPDX-License-Identifier: MIT

//! `{placeholder}` substitution for prompts and instructions
//!
//! Recognized placeholders are `{input}`, `{state.<path>}` and
//! `{variables.<path>}`. Any other braces are left alone so JSON examples
//! inside prompts survive.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::flowkit::workflow::context::{value_to_prompt, ExecutionContext};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*(input|state(?:\.[A-Za-z0-9_\-]+)+|variables(?:\.[A-Za-z0-9_\-]+)+)\s*\}")
        .expect("placeholder pattern is valid")
});

/// Substitute placeholders from the context; missing paths render empty
pub fn render(template: &str, ctx: &ExecutionContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            let value = if path == "input" {
                Some(ctx.current_value.clone())
            } else if let Some(rest) = path.strip_prefix("state.") {
                ctx.state.get_path(rest).cloned()
            } else if let Some(rest) = path.strip_prefix("variables.") {
                lookup(&Value::Object(ctx.variables.clone()), rest)
            } else {
                None
            };
            value.map(|v| value_to_prompt(&v)).unwrap_or_default()
        })
        .into_owned()
}

fn lookup(root: &Value, path: &str) -> Option<Value> {
    path.split('.')
        .try_fold(root, |current, part| match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?),
            other => other.get(part),
        })
        .cloned()
}
