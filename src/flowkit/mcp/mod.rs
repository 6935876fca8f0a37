// SPDX-License-Identifier: MIT

//! MCP client plumbing for tool-call nodes
//!
//! Servers are launched as child processes speaking MCP over stdio and
//! cached by name for the lifetime of the manager.

pub mod manager;

pub use manager::McpServiceManager;

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::{ClientHandler, ServiceExt};
use tokio::process::Command;

use crate::adk::error::FlowError;
use crate::flowkit::collaborators::McpServerConfig;

/// A connected MCP client session
pub type McpService = RunningService<RoleClient, BasicClientHandler>;

#[derive(Debug, Clone)]
pub struct BasicClientHandler;

impl ClientHandler for BasicClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        }
    }
}

/// Launch `config.command` and complete the MCP handshake over its stdio
pub async fn create_mcp_service(config: &McpServerConfig) -> Result<McpService, FlowError> {
    let mut command = Command::new(&config.command);
    command.args(&config.args).envs(&config.env);

    let transport = TokioChildProcess::new(command)?;
    BasicClientHandler.serve(transport).await.map_err(|e| {
        FlowError::tool(
            config.name.clone(),
            format!("MCP handshake with '{}' failed: {}", config.command, e),
        )
    })
}
