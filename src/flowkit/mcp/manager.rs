// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{create_mcp_service, McpService};
use crate::adk::error::FlowError;
use crate::flowkit::collaborators::{McpConnector, McpServerConfig};

type ServiceMap = HashMap<String, Arc<McpService>>;

/// Starts MCP servers on first use and reuses them afterwards
#[derive(Clone, Default)]
pub struct McpServiceManager {
    services: Arc<RwLock<ServiceMap>>,
}

impl McpServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the service for `config.name`
    pub async fn get_or_create_service(
        &self,
        config: &McpServerConfig,
    ) -> Result<Arc<McpService>, FlowError> {
        if let Some(service) = self.services.read().await.get(&config.name) {
            return Ok(service.clone());
        }

        let mut services = self.services.write().await;
        // Another task may have connected while we waited for the lock
        if let Some(service) = services.get(&config.name) {
            return Ok(service.clone());
        }

        log::info!(
            "Starting MCP server '{}': {} {:?}",
            config.name,
            config.command,
            config.args
        );
        let service = Arc::new(create_mcp_service(config).await?);
        services.insert(config.name.clone(), service.clone());
        Ok(service)
    }

    pub async fn is_connected(&self, name: &str) -> bool {
        self.services.read().await.contains_key(name)
    }
}

/// Join the text parts of a `tools/call` result
///
/// Works on the serialized result so it does not depend on the content
/// enum layout: `{"content": [{"type": "text", "text": ...}], "isError": bool}`.
fn result_text(tool: &str, result: &Value) -> Result<String, FlowError> {
    let text = result["content"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if result["isError"].as_bool().unwrap_or(false) {
        return Err(FlowError::tool(tool, text));
    }
    if text.is_empty() {
        if let Some(structured) = result.get("structuredContent").filter(|v| !v.is_null()) {
            return Ok(structured.to_string());
        }
    }
    Ok(text)
}

#[async_trait]
impl McpConnector for McpServiceManager {
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, FlowError> {
        let service = self.get_or_create_service(server).await?;
        let result = service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: Some(arguments),
            })
            .await
            .map_err(|e| FlowError::tool(tool, e.to_string()))?;

        result_text(tool, &serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_text_joins_parts() {
        let result = json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"}
            ],
            "isError": false
        });
        assert_eq!(result_text("echo", &result).unwrap(), "line one\nline two");
    }

    #[test]
    fn test_result_text_error_flag() {
        let result = json!({"content": [{"type": "text", "text": "boom"}], "isError": true});
        let err = result_text("echo", &result).unwrap_err();
        assert!(matches!(err, FlowError::ToolExecution { .. }));
    }

    #[test]
    fn test_result_text_structured_fallback() {
        let result = json!({"content": [], "structuredContent": {"sum": 3}});
        assert_eq!(result_text("add", &result).unwrap(), "{\"sum\":3}");
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let manager = McpServiceManager::new();
        let config = McpServerConfig {
            name: "ghost".to_string(),
            command: "/nonexistent/mcp-server-binary".to_string(),
            args: vec![],
            env: HashMap::new(),
        };
        assert!(manager
            .call_tool(&config, "anything", Map::new())
            .await
            .is_err());
        assert!(!manager.is_connected("ghost").await);
    }
}
