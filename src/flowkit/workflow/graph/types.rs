// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! This module defines the nodes, edges and workflow-level declarations of a
//! graph as exported by the editor. Node payloads stay untyped here; each
//! handler deserializes the fields it understands.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adk::error::FlowError;
use crate::flowkit::workflow::context::{DataSource, Document, Resources};
use crate::flowkit::workflow::state::StateSchema;

/// Edge handle labels with control-flow meaning
pub mod handles {
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    pub const BODY: &str = "body";
    pub const EXIT: &str = "exit";
    pub const KNOWLEDGE_BASE: &str = "knowledge-base";
    /// Source handle the editor puts on knowledge-base nodes
    pub const KNOWLEDGE_OUTPUT: &str = "knowledge-output";

    /// Whether `handle` is excluded from default sequential routing
    pub fn is_reserved(handle: &str) -> bool {
        matches!(
            handle,
            TRUE | FALSE | BODY | EXIT | KNOWLEDGE_BASE | KNOWLEDGE_OUTPUT
        )
    }

    /// Whether `handle` wires a resource into an agent
    pub fn is_resource(handle: &str) -> bool {
        matches!(handle, KNOWLEDGE_BASE | KNOWLEDGE_OUTPUT)
    }
}

/// A workflow graph: nodes, edges and workflow-level declarations
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Graph {
    /// Display name of the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Named inputs available to snippets as `variables`
    #[serde(default)]
    pub variables: Vec<WorkflowVariable>,
    /// Initial shape of the state map (defaults and reducers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSchema>,
}

/// A typed step in the workflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Node {
    /// Unique identifier for this node
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Type-specific payload; the editor exports it as `data`
    #[serde(default, alias = "data")]
    pub config: Map<String, Value>,
}

/// Node types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Start,
    Agent,
    Transform,
    #[serde(alias = "ifElse")]
    Conditional,
    #[serde(alias = "while")]
    Loop,
    SetState,
    #[serde(alias = "prompt")]
    PromptInject,
    #[serde(alias = "guardrails")]
    Guardrail,
    #[serde(alias = "mcp")]
    ToolCall,
    #[serde(alias = "userApproval")]
    Approval,
    #[serde(alias = "voice")]
    VoiceOutput,
    End,
    // Inert kinds: resource holders and editor decorations
    Note,
    KnowledgeBase,
    Database,
    FileSearch,
    ExternalInput,
    ExternalOutput,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Agent => "agent",
            NodeKind::Transform => "transform",
            NodeKind::Conditional => "conditional",
            NodeKind::Loop => "loop",
            NodeKind::SetState => "setState",
            NodeKind::PromptInject => "promptInject",
            NodeKind::Guardrail => "guardrail",
            NodeKind::ToolCall => "toolCall",
            NodeKind::Approval => "approval",
            NodeKind::VoiceOutput => "voiceOutput",
            NodeKind::End => "end",
            NodeKind::Note => "note",
            NodeKind::KnowledgeBase => "knowledgeBase",
            NodeKind::Database => "database",
            NodeKind::FileSearch => "fileSearch",
            NodeKind::ExternalInput => "externalInput",
            NodeKind::ExternalOutput => "externalOutput",
        }
    }

    /// Kinds that carry no behavior and pass the current value through
    pub fn is_inert(&self) -> bool {
        matches!(
            self,
            NodeKind::Note
                | NodeKind::KnowledgeBase
                | NodeKind::Database
                | NodeKind::FileSearch
                | NodeKind::ExternalInput
                | NodeKind::ExternalOutput
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            kind,
            config,
        }
    }

    /// Display name: the editor label, else the kind
    pub fn name(&self) -> String {
        self.config
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.as_str().to_string())
    }

    /// Deserialize the payload into a handler's typed config
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, FlowError> {
        serde_json::from_value(Value::Object(self.config.clone())).map_err(|e| {
            FlowError::config(format!(
                "Invalid configuration for {} node '{}': {}",
                self.kind, self.id, e
            ))
        })
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn handle(&self) -> Option<&str> {
        self.source_handle.as_deref()
    }

    /// Plain sequential edge: untagged or tagged with a non-reserved label
    pub fn is_sequential(&self) -> bool {
        self.handle().map_or(true, |h| !handles::is_reserved(h))
    }
}

/// A workflow-level named input
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: Option<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Payload of a knowledge-base node
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseConfig {
    #[serde(default)]
    documents: Vec<Document>,
    max_results: Option<usize>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The unique start node
    pub fn start_node(&self) -> Result<&Node, FlowError> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .ok_or_else(|| FlowError::config("No start node found in workflow"))
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Documents and data sources wired into `agent_id`
    pub fn attached_resources(&self, agent_id: &str) -> Resources {
        let mut resources = Resources::default();

        for edge in self.incoming(agent_id) {
            let Some(source) = self.node(&edge.source) else {
                continue;
            };
            let tagged = edge.handle().is_some_and(handles::is_resource);

            match source.kind {
                NodeKind::KnowledgeBase => match source.config_as::<KnowledgeBaseConfig>() {
                    Ok(kb) => {
                        if let Some(max) = kb.max_results {
                            resources.max_results = resources.max_results.max(max);
                        }
                        resources.documents.extend(kb.documents);
                    }
                    Err(e) => log::warn!("Ignoring knowledge base '{}': {}", source.id, e),
                },
                NodeKind::Database => match source.config_as::<DataSource>() {
                    Ok(mut ds) => {
                        if ds.name.is_empty() {
                            ds.name = source.name();
                        }
                        resources.data_sources.push(ds);
                    }
                    Err(e) => log::warn!("Ignoring data source '{}': {}", source.id, e),
                },
                _ if tagged => log::warn!(
                    "Edge '{}' uses a resource handle but '{}' is a {} node",
                    edge.id,
                    source.id,
                    source.kind
                ),
                _ => {}
            }
        }

        resources
    }

    /// Merge caller-supplied variables over declared defaults
    pub fn resolve_variables(
        &self,
        provided: &Map<String, Value>,
    ) -> Result<Map<String, Value>, FlowError> {
        let mut resolved = Map::new();

        for var in &self.variables {
            match provided.get(&var.name).or(var.default_value.as_ref()) {
                Some(value) => {
                    resolved.insert(var.name.clone(), value.clone());
                }
                None if var.required => {
                    return Err(FlowError::config(format!(
                        "Required variable '{}' has no value",
                        var.name
                    )));
                }
                None => {}
            }
        }

        // Undeclared variables are passed through as-is
        for (name, value) in provided {
            resolved.entry(name.clone()).or_insert_with(|| value.clone());
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_editor_export() {
        let graph: Graph = serde_json::from_value(json!({
            "nodes": [
                {"id": "start-1", "type": "start", "position": {"x": 0, "y": 0}, "data": {"label": "Start"}},
                {"id": "agent-1", "type": "agent", "data": {"model": "llama3.1:8b", "instructions": "Help"}},
                {"id": "if-1", "type": "ifElse", "data": {"condition": "return input.length > 2"}},
                {"id": "loop-1", "type": "while", "data": {"maxIterations": 3}}
            ],
            "edges": [
                {"id": "e1", "source": "start-1", "target": "agent-1"},
                {"id": "e2", "source": "if-1", "target": "agent-1", "sourceHandle": "true"}
            ]
        }))
        .unwrap();

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.nodes[2].kind, NodeKind::Conditional);
        assert_eq!(graph.nodes[3].kind, NodeKind::Loop);
        assert_eq!(graph.nodes[0].name(), "Start");
        assert_eq!(graph.nodes[1].name(), "agent");
        assert_eq!(graph.edges[1].handle(), Some("true"));
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let result: Result<Node, _> = serde_json::from_value(json!({"id": "x", "type": "teleport"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_legacy_aliases() {
        for (alias, kind) in [
            ("prompt", NodeKind::PromptInject),
            ("guardrails", NodeKind::Guardrail),
            ("mcp", NodeKind::ToolCall),
            ("userApproval", NodeKind::Approval),
            ("voice", NodeKind::VoiceOutput),
            ("setState", NodeKind::SetState),
        ] {
            let node: Node = serde_json::from_value(json!({"id": "n", "type": alias})).unwrap();
            assert_eq!(node.kind, kind, "alias {}", alias);
        }
    }

    #[test]
    fn test_sequential_edges() {
        assert!(Edge::new("a", "b").is_sequential());
        assert!(Edge::new("a", "b").with_handle("source").is_sequential());
        for reserved in ["true", "false", "body", "exit", "knowledge-base"] {
            assert!(!Edge::new("a", "b").with_handle(reserved).is_sequential());
        }
    }

    #[test]
    fn test_config_as_reports_node() {
        #[derive(Debug, Deserialize)]
        struct Typed {
            #[allow(dead_code)]
            count: u32,
        }
        let node = Node::new("n1", NodeKind::Transform, json!({"count": "many"}));
        let err = node.config_as::<Typed>().unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
        assert!(err.to_string().contains("n1"));
    }

    #[test]
    fn test_attached_resources() {
        let graph = Graph {
            nodes: vec![
                Node::new(
                    "kb",
                    NodeKind::KnowledgeBase,
                    json!({"documents": [{"name": "faq.md", "content": "Refunds take 5 days"}], "maxResults": 3}),
                ),
                Node::new(
                    "db",
                    NodeKind::Database,
                    json!({"label": "Orders", "dbType": "sqlite", "connectionString": "orders.db"}),
                ),
                Node::new("agent", NodeKind::Agent, json!({})),
            ],
            edges: vec![
                Edge::new("kb", "agent").with_handle("knowledge-output"),
                Edge::new("db", "agent"),
            ],
            ..Default::default()
        };

        let resources = graph.attached_resources("agent");
        assert_eq!(resources.documents.len(), 1);
        assert_eq!(resources.max_results, 5);
        assert_eq!(resources.data_sources.len(), 1);
        assert_eq!(resources.data_sources[0].name, "Orders");
        assert!(graph.attached_resources("kb").is_empty());
    }

    #[test]
    fn test_resolve_variables() {
        let graph = Graph {
            variables: vec![
                WorkflowVariable {
                    name: "tone".to_string(),
                    var_type: Some("string".to_string()),
                    default_value: Some(json!("formal")),
                    description: String::new(),
                    required: false,
                },
                WorkflowVariable {
                    name: "user".to_string(),
                    var_type: None,
                    default_value: None,
                    description: String::new(),
                    required: true,
                },
            ],
            ..Default::default()
        };

        let mut provided = Map::new();
        assert!(graph.resolve_variables(&provided).is_err());

        provided.insert("user".to_string(), json!("ada"));
        provided.insert("extra".to_string(), json!(1));
        let resolved = graph.resolve_variables(&provided).unwrap();
        assert_eq!(resolved["tone"], "formal");
        assert_eq!(resolved["user"], "ada");
        assert_eq!(resolved["extra"], 1);
    }
}
