// SPDX-License-Identifier: MIT

//! Sandboxed evaluation of user-authored snippets
//!
//! Transform, conditional, loop and setState nodes carry small snippets
//! such as `return input.toUpperCase();` or `state.n < 2`. They run
//! against an explicit set of bindings and a fixed library of pure
//! built-ins; nothing else is reachable.

mod ast;
mod evaluator;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expression, Literal, LogicalOp, Program, TemplatePart, UnaryOp};
pub use evaluator::{
    evaluate, is_truthy, number_value, run_program, to_js_string, to_number, Bindings,
};
pub use parser::{parse, parse_expression};

use crate::adk::error::FlowError;
use serde_json::Value;

/// Deepest parser nesting a snippet may reach
const MAX_NESTING: usize = 100;

/// Deepest expression tree the evaluator will walk
const MAX_EVAL_DEPTH: usize = 256;

fn too_deep() -> FlowError {
    FlowError::evaluation("Expression nested too deeply")
}

/// Runs a snippet against bindings
///
/// Implementations must not expose anything beyond the bindings. Errors are
/// reported as `FlowError::Evaluation`; callers decide whether they are fatal.
pub trait Evaluator: Send + Sync {
    fn run(&self, snippet: &str, bindings: &Bindings) -> Result<Value, FlowError>;
}

/// The built-in evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ExpressionEvaluator {
    fn run(&self, snippet: &str, bindings: &Bindings) -> Result<Value, FlowError> {
        let program = parse(snippet)?;
        run_program(&program, bindings)
    }
}
