// SPDX-License-Identifier: MIT

pub mod context;
pub mod expression;
pub mod graph;
pub mod handlers;
pub mod loader;
pub mod logger;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod template;

pub use context::ExecutionContext;
pub use graph::{ExecutionFailure, ExecutionResult, Graph, RunOptions, WorkflowExecutor};
pub use loader::load_graph;
