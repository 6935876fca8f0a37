// SPDX-License-Identifier: MIT

//! Integration tests for workflow loading and execution
//!
//! These tests drive whole graphs through `WorkflowExecutor` using mock
//! providers and tools.

use async_trait::async_trait;
use flowkit_rs::adk::error::FlowError;
use flowkit_rs::adk::model::{
    ChatMessage, ChatResponse, GenerateRequest, GenerationConfig, LlmProvider, ToolCall,
};
use flowkit_rs::adk::tool::{Tool, ToolDefinition};
use flowkit_rs::flowkit::workflow::graph::{Graph, NodeKind, RunOptions, WorkflowExecutor};
use flowkit_rs::flowkit::workflow::load_graph;
use flowkit_rs::flowkit::workflow::logger::ExecutionLogEntry;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Components
// ============================================================================

/// Mock provider: `generate` answers with the system prompt, the tool-capable
/// chat asks for one tool call, and `chat` returns a fixed final answer
#[derive(Default)]
struct MockProvider {
    generate_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    tool_chat_calls: AtomicUsize,
    request_tool: Option<String>,
}

impl MockProvider {
    fn requesting_tool(name: &str) -> Self {
        Self {
            request_tool: Some(name.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, _model: &str, request: GenerateRequest) -> Result<String, FlowError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(request.system.unwrap_or_default())
    }

    async fn chat(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _config: Option<&GenerationConfig>,
    ) -> Result<String, FlowError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok("final answer".to_string())
    }

    async fn chat_with_tools(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
        _config: Option<&GenerationConfig>,
    ) -> Result<ChatResponse, FlowError> {
        self.tool_chat_calls.fetch_add(1, Ordering::SeqCst);
        let tool_calls = self
            .request_tool
            .iter()
            .map(|name| ToolCall {
                name: name.clone(),
                arguments: json!({"query": "status"}),
            })
            .collect();
        Ok(ChatResponse {
            content: "direct answer".to_string(),
            tool_calls,
            thinking: None,
        })
    }
}

static LOOKUP_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"}
        },
        "required": ["query"]
    })
});

/// Tool that counts its calls and returns nothing
#[derive(Default)]
struct SilentLookup {
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for SilentLookup {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Looks something up"
    }

    fn schema(&self) -> &Value {
        &LOOKUP_SCHEMA
    }

    async fn execute(&self, _input: Value) -> Result<Value, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!(""))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn executor() -> WorkflowExecutor {
    WorkflowExecutor::new(Arc::new(MockProvider::default()))
}

fn graph(value: Value) -> Graph {
    serde_json::from_value(value).unwrap()
}

fn visited(log: &[ExecutionLogEntry]) -> Vec<&str> {
    log.iter().map(|e| e.node_id.as_str()).collect()
}

fn entry<'a>(log: &'a [ExecutionLogEntry], id: &str) -> &'a ExecutionLogEntry {
    log.iter().find(|e| e.node_id == id).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_uppercase_transform() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "upper", "type": "transform", "data": {"code": "return input.toUpperCase()"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "upper"},
            {"source": "upper", "target": "end"}
        ]
    }));

    let result = executor().execute(&g, json!("hi")).await.unwrap();
    assert_eq!(result.result, json!("HI"));
    assert_eq!(visited(&result.log), vec!["start", "upper", "end"]);
}

#[tokio::test]
async fn test_short_input_routes_to_false_branch() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "check", "type": "conditional", "data": {"condition": "return input.length > 2"}},
            {"id": "agentA", "type": "agent", "data": {"model": "m", "instructions": "A"}},
            {"id": "agentB", "type": "agent", "data": {"model": "m", "instructions": "B"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "check"},
            {"source": "check", "target": "agentA", "sourceHandle": "true"},
            {"source": "check", "target": "agentB", "sourceHandle": "false"},
            {"source": "agentA", "target": "end"},
            {"source": "agentB", "target": "end"}
        ]
    }));

    let result = executor().execute(&g, json!("ab")).await.unwrap();
    assert_eq!(result.result, json!("B"));
    assert_eq!(visited(&result.log), vec!["start", "check", "agentB", "end"]);
    assert_eq!(entry(&result.log, "check").branch.as_deref(), Some("false"));
}

#[tokio::test]
async fn test_counter_loop_runs_twice() {
    let g = graph(json!({
        "state": {"n": {"type": "number", "default": 0}},
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "loop", "type": "while", "data": {"condition": "return state.n < 2", "maxIterations": 10}},
            {"id": "inc", "type": "setState", "data": {"key": "n", "value": "return state.n + 1"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "loop"},
            {"source": "loop", "target": "inc", "sourceHandle": "body"},
            {"source": "inc", "target": "loop"},
            {"source": "loop", "target": "end", "sourceHandle": "exit"}
        ]
    }));

    let result = executor().execute(&g, json!("go")).await.unwrap();
    assert_eq!(result.state["n"], json!(2));
    assert_eq!(visited(&result.log), vec!["start", "inc", "inc", "loop", "end"]);
    // setState leaves the current value alone
    assert_eq!(result.result, json!("go"));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_missing_start_fails_before_logging() {
    let g = graph(json!({
        "nodes": [{"id": "t", "type": "transform"}, {"id": "end", "type": "end"}],
        "edges": [{"source": "t", "target": "end"}]
    }));

    let failure = executor().execute(&g, json!("x")).await.unwrap_err();
    assert!(matches!(failure.error, FlowError::Configuration(_)));
    assert!(failure.log.is_empty());
}

#[tokio::test]
async fn test_linear_path_logs_every_node() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "a", "type": "transform", "data": {"code": "return input + 'a'"}},
            {"id": "b", "type": "promptInject", "data": {"template": "[{input}]"}},
            {"id": "c", "type": "transform", "data": {"code": "return input + 'c'"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "a"},
            {"source": "a", "target": "b"},
            {"source": "b", "target": "c"},
            {"source": "c", "target": "end"}
        ]
    }));

    let result = executor().execute(&g, json!("x")).await.unwrap();
    assert_eq!(result.result, json!("[xa]c"));
    assert_eq!(result.log.len(), 5);
    assert_eq!(result.log.last().unwrap().output, result.result);
}

#[tokio::test]
async fn test_true_branch_keeps_value() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "check", "type": "conditional", "data": {"condition": "return input.startsWith('yes')"}},
            {"id": "yes", "type": "transform", "data": {"code": "return input"}},
            {"id": "no", "type": "transform", "data": {"code": "return 'rejected'"}}
        ],
        "edges": [
            {"source": "start", "target": "check"},
            {"source": "check", "target": "yes", "sourceHandle": "true"},
            {"source": "check", "target": "no", "sourceHandle": "false"}
        ]
    }));

    let result = executor().execute(&g, json!("yes please")).await.unwrap();
    assert_eq!(visited(&result.log), vec!["start", "check", "yes"]);
    let check = entry(&result.log, "check");
    assert_eq!(check.output, check.input);
    assert_eq!(entry(&result.log, "yes").input, json!("yes please"));
}

#[tokio::test]
async fn test_loop_cap_exits_through_exit_edge() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "loop", "type": "loop", "data": {"condition": "return true", "maxIterations": 3}},
            {"id": "body", "type": "transform", "data": {"code": "return input + 1"}},
            {"id": "after", "type": "transform", "data": {"code": "return input * 10"}}
        ],
        "edges": [
            {"source": "start", "target": "loop"},
            {"source": "loop", "target": "body", "sourceHandle": "body"},
            {"source": "body", "target": "loop"},
            {"source": "loop", "target": "after", "sourceHandle": "exit"}
        ]
    }));

    let result = executor().execute(&g, json!(0)).await.unwrap();
    let bodies = result.log.iter().filter(|e| e.node_id == "body").count();
    assert_eq!(bodies, 3);
    assert_eq!(result.result, json!(30));
    assert_eq!(visited(&result.log)[4..], ["loop", "after"]);
}

#[tokio::test]
async fn test_repeated_set_state_is_idempotent() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "twice", "type": "loop", "data": {"condition": "return true", "maxIterations": 2}},
            {"id": "set", "type": "setState", "data": {"key": "x", "value": "v"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "twice"},
            {"source": "twice", "target": "set", "sourceHandle": "body"},
            {"source": "set", "target": "twice"},
            {"source": "twice", "target": "end", "sourceHandle": "exit"}
        ]
    }));

    let result = executor().execute(&g, json!("x")).await.unwrap();
    assert_eq!(result.log.iter().filter(|e| e.node_id == "set").count(), 2);
    assert_eq!(result.state["x"], json!("v"));
}

#[tokio::test]
async fn test_tool_round_trip_with_empty_result() {
    let provider = Arc::new(MockProvider::requesting_tool("lookup"));
    let tool = Arc::new(SilentLookup::default());
    let executor = WorkflowExecutor::new(provider.clone());
    executor.register_tool(tool.clone()).await;

    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "agent", "type": "agent", "data": {"model": "m", "useTools": true}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "agent"},
            {"source": "agent", "target": "end"}
        ]
    }));

    let result = executor.execute(&g, json!("what is the status?")).await.unwrap();
    assert_eq!(result.result, json!("final answer"));
    assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.tool_chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_tool_does_not_abort() {
    // Nothing named "missing" is registered; the error goes back to the model
    let provider = Arc::new(MockProvider::requesting_tool("missing"));
    let executor = WorkflowExecutor::new(provider.clone());

    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "agent", "type": "agent", "data": {"model": "m", "useTools": true}}
        ],
        "edges": [{"source": "start", "target": "agent"}]
    }));

    let result = executor.execute(&g, json!("q")).await.unwrap();
    assert_eq!(result.result, json!("final answer"));
    assert!(entry(&result.log, "agent").error.is_none());
}

#[tokio::test]
async fn test_agent_without_model_fails_with_partial_log() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "agent", "type": "agent", "data": {"instructions": "Hi"}}
        ],
        "edges": [{"source": "start", "target": "agent"}]
    }));

    let failure = executor().execute(&g, json!("q")).await.unwrap_err();
    assert!(matches!(failure.error, FlowError::Configuration(_)));
    assert_eq!(failure.node_id.as_deref(), Some("agent"));
    assert_eq!(visited(&failure.log), vec!["start", "agent"]);
    assert!(failure.log[1].error.is_some());
}

#[tokio::test]
async fn test_stub_collaborators_pass_through() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "guard", "type": "guardrails", "data": {"rules": "return false"}},
            {"id": "mcp", "type": "mcp", "data": {"server": {"name": "fs", "command": "mcp-fs"}, "tool": "read"}},
            {"id": "ask", "type": "userApproval", "data": {"approvalMessage": "Ok?"}},
            {"id": "speak", "type": "voice", "data": {"speed": 1.5}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "guard"},
            {"source": "guard", "target": "mcp"},
            {"source": "mcp", "target": "ask"},
            {"source": "ask", "target": "speak"},
            {"source": "speak", "target": "end"}
        ]
    }));

    let result = executor().execute(&g, json!("unchanged")).await.unwrap();
    assert_eq!(result.result, json!("unchanged"));
    assert_eq!(result.log.len(), 6);
    assert!(result.log.iter().all(|e| e.output == json!("unchanged")));
}

#[tokio::test]
async fn test_observer_sees_log_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = move |entry: &ExecutionLogEntry| {
        sink.lock().unwrap().push(entry.node_id.clone());
    };

    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "t", "type": "transform"},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "t"},
            {"source": "t", "target": "end"}
        ]
    }));

    let options = RunOptions {
        observer: Some(Arc::new(observer)),
        ..Default::default()
    };
    let result = executor().execute_with(&g, json!(1), options).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), visited(&result.log));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let g = graph(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "save", "type": "setState", "data": {"key": "seen"}},
            {"id": "end", "type": "end"}
        ],
        "edges": [
            {"source": "start", "target": "save"},
            {"source": "save", "target": "end"}
        ]
    }));

    let executor = executor();
    let (a, b) = tokio::join!(
        executor.execute(&g, json!("first")),
        executor.execute(&g, json!("second"))
    );
    assert_eq!(a.unwrap().state["seen"], json!("first"));
    assert_eq!(b.unwrap().state["seen"], json!("second"));
}

#[tokio::test]
async fn test_variables_reach_templates() {
    let g = graph(json!({
        "variables": [
            {"name": "product", "defaultValue": "Acme"},
            {"name": "tier", "required": true}
        ],
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "p", "type": "promptInject", "data": {"promptText": "{variables.product} {variables.tier}: {input}"}}
        ],
        "edges": [{"source": "start", "target": "p"}]
    }));

    let missing = executor().execute(&g, json!("hello")).await.unwrap_err();
    assert!(matches!(missing.error, FlowError::Configuration(_)));

    let options = RunOptions {
        variables: [("tier".to_string(), json!("gold"))].into_iter().collect(),
        ..Default::default()
    };
    let result = executor()
        .execute_with(&g, json!("hello"), options)
        .await
        .unwrap();
    assert_eq!(result.result, json!("Acme gold: hello"));
}

// ============================================================================
// Sample workflows
// ============================================================================

#[test]
fn test_sample_workflows_load_and_validate() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflows");
    let mut loaded = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        let graph = load_graph(&path).unwrap();
        graph
            .validate()
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        assert_eq!(graph.start_node().unwrap().kind, NodeKind::Start);
        loaded += 1;
    }
    assert_eq!(loaded, 3);
}

#[tokio::test]
async fn test_triage_sample_attaches_faq() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflows/support_triage.json");
    let g = load_graph(path).unwrap();

    let resources = g.attached_resources("answer");
    assert_eq!(resources.documents.len(), 1);
    assert!(g.attached_resources("escalate").is_empty());

    let result = executor()
        .execute(&g, json!("How do I reset my password?"))
        .await
        .unwrap();
    assert_eq!(
        visited(&result.log),
        vec!["start", "is-urgent", "answer", "end"]
    );
    // Attached documents send the agent through the tool-capable chat
    assert_eq!(result.result, json!("direct answer"));
}
