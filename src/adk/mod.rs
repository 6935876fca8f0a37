// SPDX-License-Identifier: MIT

//! Agent development kit - provider-agnostic building blocks
//!
//! - [error] - the `FlowError` taxonomy
//! - [model] - the `LlmProvider` contract and its Ollama implementation
//! - [tool] - the `Tool` and `ToolProvider` contracts

pub mod error;
pub mod model;
pub mod tool;
