// SPDX-License-Identifier: MIT

//! flowkit-rs - a workflow execution engine for graphs of LLM-backed steps
//!
//! A workflow is a directed graph of typed nodes (model calls, branches,
//! bounded loops, state mutations, tool invocations). The engine walks the
//! graph against a local model provider and returns the final value together
//! with an ordered execution log.

pub mod adk;
pub mod flowkit;
