// SPDX-License-Identifier: MIT

//! Host-registered tools shared by every agent node

use crate::adk::tool::{Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tools offered to every tool-enabled agent, keyed by name
///
/// Clones share the same map, so a tool registered through one handle is
/// visible to executors holding another.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a tool, replacing any tool with the same name
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        log::debug!("Registered tool: {}", name);
        if self.tools.write().await.insert(name.clone(), tool).is_some() {
            log::warn!("Tool '{}' was already registered and has been replaced", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Manifest entries for every registered tool, sorted by name
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut definitions: Vec<_> = tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
