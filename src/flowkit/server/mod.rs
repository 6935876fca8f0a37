// SPDX-License-Identifier: MIT

//! HTTP adapter over the workflow executor
//!
//! - `GET  /api/health`
//! - `GET  /api/models` - models known to the provider
//! - `POST /api/executions` - run a graph, answer with result and log
//! - `POST /api/executions/stream` - run a graph, stream log entries and
//!   node states as Server-Sent Events, then `result` or `error`

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::adk::error::FlowError;
use crate::flowkit::workflow::graph::{
    ExecutionFailure, ExecutionResult, Graph, RunOptions, WorkflowExecutor,
};
use crate::flowkit::workflow::logger::{ExecutionLogEntry, ExecutionObserver, NodeState};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    executor: Arc<WorkflowExecutor>,
}

impl AppState {
    pub fn new(executor: WorkflowExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }
}

/// Routes with CORS and request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/executions", post(create_execution))
        .route("/api/executions/stream", post(stream_execution))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(executor: WorkflowExecutor, port: u16) -> Result<(), FlowError> {
    let app = router(AppState::new(executor));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_models(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.executor.provider().list_models().await {
        Ok(models) => (StatusCode::OK, Json(json!({ "models": models }))),
        Err(e) => {
            log::warn!("Listing models failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct ExecutionRequest {
    graph: Graph,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    variables: Map<String, Value>,
}

fn failure_body(failure: &ExecutionFailure) -> Value {
    json!({
        "error": failure.error.to_string(),
        "nodeId": failure.node_id,
        "log": failure.log,
    })
}

async fn create_execution(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> (StatusCode, Json<Value>) {
    let execution_id = Uuid::new_v4().to_string();
    log::info!("Execution {} started", execution_id);
    let options = RunOptions {
        variables: payload.variables,
        ..Default::default()
    };

    let (status, mut body) = match state
        .executor
        .execute_with(&payload.graph, payload.input, options)
        .await
    {
        Ok(result) => (StatusCode::OK, json!(result)),
        Err(failure) => {
            log::error!("Execution {} failed: {}", execution_id, failure);
            (StatusCode::UNPROCESSABLE_ENTITY, failure_body(&failure))
        }
    };
    body["executionId"] = json!(execution_id);
    (status, Json(body))
}

/// Events pushed to a streaming client, in emission order
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum StreamEvent {
    Log(ExecutionLogEntry),
    Node {
        #[serde(rename = "nodeId")]
        node_id: String,
        state: NodeState,
    },
    Result(ExecutionResult),
    Error(Value),
}

impl StreamEvent {
    fn name(&self) -> &'static str {
        match self {
            StreamEvent::Log(_) => "log",
            StreamEvent::Node { .. } => "node",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
        }
    }

    fn into_sse(self) -> Event {
        let name = self.name();
        Event::default()
            .event(name)
            .json_data(&self)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
    }
}

/// Forwards observer callbacks into the SSE channel
struct ChannelObserver {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ExecutionObserver for ChannelObserver {
    fn on_log(&self, entry: &ExecutionLogEntry) {
        let _ = self.tx.send(StreamEvent::Log(entry.clone()));
    }

    fn on_node_state_change(&self, node_id: &str, state: NodeState) {
        let _ = self.tx.send(StreamEvent::Node {
            node_id: node_id.to_string(),
            state,
        });
    }
}

async fn stream_execution(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let execution_id = Uuid::new_v4();
    log::info!("Streaming execution {} started", execution_id);

    // Stop the run once the client goes away
    {
        let watcher = tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher.closed() => {
                    log::info!("Client of execution {} disconnected, cancelling", execution_id);
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }

    tokio::spawn(async move {
        let options = RunOptions {
            variables: payload.variables,
            cancel: Some(cancel.clone()),
            observer: Some(Arc::new(ChannelObserver { tx: tx.clone() })),
            ..Default::default()
        };

        let outcome = state
            .executor
            .execute_with(&payload.graph, payload.input, options)
            .await;
        let event = match outcome {
            Ok(result) => StreamEvent::Result(result),
            Err(failure) => {
                log::error!("Execution {} failed: {}", execution_id, failure);
                StreamEvent::Error(failure_body(&failure))
            }
        };
        let _ = tx.send(event);
        // Releases the disconnect watcher
        cancel.cancel();
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(event.into_sse()));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::{
        ChatMessage, ChatResponse, GenerateRequest, GenerationConfig, LlmProvider, ModelInfo,
    };
    use crate::adk::tool::ToolDefinition;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl LlmProvider for Offline {
        async fn generate(&self, _: &str, _: GenerateRequest) -> Result<String, FlowError> {
            Err(FlowError::provider("ollama", "connection refused"))
        }

        async fn chat(
            &self,
            _: &str,
            _: &[ChatMessage],
            _: Option<&GenerationConfig>,
        ) -> Result<String, FlowError> {
            Err(FlowError::provider("ollama", "connection refused"))
        }

        async fn chat_with_tools(
            &self,
            _: &str,
            _: &[ChatMessage],
            _: Option<&[ToolDefinition]>,
            _: Option<&GenerationConfig>,
        ) -> Result<ChatResponse, FlowError> {
            Ok(ChatResponse::default())
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, FlowError> {
            Err(FlowError::provider("ollama", "connection refused"))
        }
    }

    fn state() -> AppState {
        AppState::new(WorkflowExecutor::new(Arc::new(Offline)))
    }

    fn request(graph: Value) -> ExecutionRequest {
        serde_json::from_value(json!({"graph": graph, "input": "hi"})).unwrap()
    }

    #[tokio::test]
    async fn test_execution_success() {
        let graph = json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "t", "type": "transform", "data": {"code": "return input + ' there'"}}
            ],
            "edges": [{"source": "s", "target": "t"}]
        });
        let (status, Json(body)) = create_execution(State(state()), Json(request(graph))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!("hi there"));
        assert_eq!(body["executionId"].as_str().unwrap().len(), 36);
        assert_eq!(body["log"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_log() {
        let graph = json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "a", "type": "agent", "data": {"model": "llama3.2:3b"}}
            ],
            "edges": [{"source": "s", "target": "a"}]
        });
        let (status, Json(body)) = create_execution(State(state()), Json(request(graph))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["nodeId"], json!("a"));
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(body["log"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_models_unavailable() {
        let (status, _) = list_models(State(state())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_stream_event_names() {
        let node = StreamEvent::Node {
            node_id: "a".to_string(),
            state: NodeState::Running,
        };
        assert_eq!(node.name(), "node");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"nodeId": "a", "state": "running"})
        );
        assert_eq!(StreamEvent::Error(json!({})).name(), "error");
    }
}
