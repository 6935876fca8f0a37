// SPDX-License-Identifier: MIT

//! Workflow engine, its collaborators and the HTTP surface

pub mod collaborators;
pub mod config;
pub mod mcp;
pub mod server;
pub mod tools;
pub mod workflow;
