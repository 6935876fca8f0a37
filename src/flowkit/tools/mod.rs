// SPDX-License-Identifier: MIT

//! Built-in tools and the per-agent toolbox
//!
//! - [search] - `web_search`, the research tool every tool-enabled agent gets
//! - [knowledge] - `search_knowledge_base` over attached documents
//! - [database] - `query_database` over attached data sources

pub mod database;
pub mod knowledge;
pub mod search;

pub use database::DatabaseQueryTool;
pub use knowledge::KnowledgeSearchTool;
pub use search::WebSearchTool;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adk::error::FlowError;
use crate::adk::tool::{result_to_text, Tool, ToolDefinition, ToolProvider};
use crate::flowkit::workflow::context::Resources;
use crate::flowkit::workflow::registry::ToolRegistry;

/// The tools one agent node may call
pub struct Toolbox {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Toolbox {
    /// Research tool, registered host tools, plus knowledge and database
    /// tools when the agent has matching resources attached
    pub async fn for_agent(registry: &ToolRegistry, resources: &Resources) -> Self {
        let mut tools: BTreeMap<String, Arc<dyn Tool>> = BTreeMap::new();

        for definition in registry.definitions().await {
            if let Some(tool) = registry.get(&definition.name).await {
                tools.insert(definition.name, tool);
            }
        }
        tools
            .entry("web_search".to_string())
            .or_insert_with(|| Arc::new(WebSearchTool::new()) as Arc<dyn Tool>);

        if !resources.documents.is_empty() {
            let tool = KnowledgeSearchTool::new(&resources.documents, resources.max_results);
            tools.insert(tool.name().to_string(), Arc::new(tool));
        }
        if !resources.data_sources.is_empty() {
            let tool = DatabaseQueryTool::new(resources.data_sources.clone());
            tools.insert(tool.name().to_string(), Arc::new(tool));
        }

        Self { tools }
    }

    /// Tool definitions advertised to the model
    pub fn manifest(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ToolProvider for Toolbox {
    async fn execute_tool(&self, name: &str, args: Value) -> Result<String, FlowError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| FlowError::tool(name, "Unknown tool"))?;
        log::info!("Executing tool {} with {}", name, args);
        let output = tool.execute(args).await?;
        Ok(result_to_text(&output))
    }
}
