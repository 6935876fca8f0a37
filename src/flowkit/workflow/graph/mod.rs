// SPDX-License-Identifier: MIT

//! Workflow graphs and their execution
//!
//! - [types] - nodes, edges, variables and resource wiring
//! - [router] - successor selection, including branch and loop handles
//! - [executor] - the iterative driver that walks a graph

pub mod executor;
pub mod router;
pub mod types;
mod validate;

pub use executor::{ExecutionFailure, ExecutionResult, RunOptions, WorkflowExecutor};
pub use router::Router;
pub use types::{handles, Edge, Graph, Node, NodeKind, WorkflowVariable};
