// SPDX-License-Identifier: MIT

//! Workflow state
//!
//! - `StateSchema` declares fields, defaults and reducers
//! - `WorkflowState` holds the values written by `setState` nodes

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::WorkflowState;
