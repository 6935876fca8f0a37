// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Walks a graph from its start node one node at a time. Loops are driven
//! by an explicit frame stack instead of recursion, so path length never
//! grows the call stack.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::router::Router;
use super::types::{Graph, Node, NodeKind};
use crate::adk::error::FlowError;
use crate::adk::model::LlmProvider;
use crate::adk::tool::Tool;
use crate::flowkit::collaborators::Collaborators;
use crate::flowkit::config::EngineConfig;
use crate::flowkit::workflow::context::{ExecutionContext, Resources};
use crate::flowkit::workflow::expression::{Evaluator, ExpressionEvaluator};
use crate::flowkit::workflow::handlers::{self, LoopSettings, NodeOutcome, NodeServices};
use crate::flowkit::workflow::logger::{
    ExecutionLogEntry, ExecutionLogger, ExecutionObserver, NodeState,
};
use crate::flowkit::workflow::registry::ToolRegistry;
use crate::flowkit::workflow::state::WorkflowState;

/// A completed run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// The current value when the run stopped
    pub result: Value,
    pub log: Vec<ExecutionLogEntry>,
    /// Final workflow state
    pub state: Value,
}

/// A failed run, with the log accumulated up to the failure
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    #[source]
    pub error: FlowError,
    /// The node that failed, if the failure came from a node
    pub node_id: Option<String>,
    pub log: Vec<ExecutionLogEntry>,
}

impl ExecutionFailure {
    fn before_start(error: FlowError) -> Self {
        Self {
            error,
            node_id: None,
            log: Vec::new(),
        }
    }
}

/// Per-run inputs besides the initial value
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Overrides for the graph's declared variables
    pub variables: Map<String, Value>,
    /// State written before the first node, bypassing reducers
    pub initial_state: Map<String, Value>,
    /// Checked between node executions
    pub cancel: Option<CancellationToken>,
    /// Replaces the executor's observer for this run
    pub observer: Option<Arc<dyn ExecutionObserver>>,
}

/// Runs workflow graphs against an LLM provider
#[derive(Clone)]
pub struct WorkflowExecutor {
    services: NodeServices,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl WorkflowExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            services: NodeServices {
                provider,
                evaluator: Arc::new(ExpressionEvaluator::new()),
                tools: ToolRegistry::new(),
                collaborators: Collaborators::new(),
                config: EngineConfig::default(),
            },
            observer: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.services.config = config;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.services.evaluator = evaluator;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.services.tools = tools;
        self
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.services.collaborators = collaborators;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.services.provider
    }

    /// Register a host tool offered to tool-enabled agents
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.services.tools.register(tool).await;
    }

    /// Run `graph` with `input` as the initial value
    pub async fn execute(
        &self,
        graph: &Graph,
        input: Value,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        self.execute_with(graph, input, RunOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        graph: &Graph,
        input: Value,
        options: RunOptions,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        graph.validate().map_err(ExecutionFailure::before_start)?;
        let variables = graph
            .resolve_variables(&options.variables)
            .map_err(ExecutionFailure::before_start)?;

        let mut state = WorkflowState::from_schema(graph.state.as_ref());
        state.seed(options.initial_state);

        let observer = options.observer.or_else(|| self.observer.clone());
        let run = Run {
            graph,
            router: Router::new(graph),
            services: &self.services,
            ctx: ExecutionContext::new(input, state, variables),
            logger: ExecutionLogger::new(observer),
            frames: Vec::new(),
            cancel: options.cancel,
            steps: 0,
        };

        log::info!(
            "Starting workflow {} ({} nodes, {} edges)",
            graph.name.as_deref().unwrap_or("<unnamed>"),
            graph.nodes.len(),
            graph.edges.len()
        );
        run.drive().await
    }
}

/// An active loop
struct LoopFrame<'g> {
    node: &'g Node,
    settings: LoopSettings,
    iterations: u32,
    started: Instant,
    input: Value,
    /// Nodes run in the current iteration
    visited: HashSet<&'g str>,
}

/// State of one `execute` call
struct Run<'g, 's> {
    graph: &'g Graph,
    router: Router<'g>,
    services: &'s NodeServices,
    ctx: ExecutionContext,
    logger: ExecutionLogger,
    frames: Vec<LoopFrame<'g>>,
    cancel: Option<CancellationToken>,
    steps: usize,
}

impl<'g, 's> Run<'g, 's> {
    async fn drive(mut self) -> Result<ExecutionResult, ExecutionFailure> {
        let start = self
            .graph
            .start_node()
            .map_err(ExecutionFailure::before_start)?;
        let mut cursor: Option<&'g str> = Some(start.id.as_str());

        loop {
            let Some(id) = cursor else {
                if self.frames.is_empty() {
                    return Ok(self.finish());
                }
                // The body ran out of successors: this iteration is over
                cursor = self.check_loop()?;
                continue;
            };

            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                log::warn!("Run cancelled before node '{}'", id);
                return Err(self.fail(FlowError::Cancelled, Some(id)));
            }

            self.steps += 1;
            if self.steps > self.services.config.max_steps {
                let error = FlowError::config(format!(
                    "Run exceeded {} steps; the graph has a cycle that does not pass through a loop node",
                    self.services.config.max_steps
                ));
                return Err(self.fail(error, Some(id)));
            }

            let graph = self.graph;
            let node = graph
                .node(id)
                .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
                .map_err(|e| self.fail(e, Some(id)))?;

            if node.kind == NodeKind::Loop {
                cursor = self.enter_loop(node)?;
                continue;
            }

            if let Some(frame) = self.frames.last_mut() {
                if !frame.visited.insert(id) {
                    log::warn!(
                        "Node '{}' revisited inside loop '{}', ending the iteration",
                        id,
                        frame.node.id
                    );
                    cursor = self.check_loop()?;
                    continue;
                }
            }

            let outcome = self.run_node(node).await?;

            if outcome.halt {
                log::info!("Node '{}' halted the run", id);
                return Ok(self.finish());
            }

            if node.kind == NodeKind::End {
                if self.frames.is_empty() {
                    return Ok(self.finish());
                }
                cursor = self.check_loop()?;
                continue;
            }

            cursor = self.router.next(node, outcome.branch);
        }
    }

    /// Execute one node, record it and make its output the current value
    async fn run_node(&mut self, node: &'g Node) -> Result<NodeOutcome, ExecutionFailure> {
        let input = self.ctx.current_value.clone();
        let started = Instant::now();

        log::info!("Executing node: {} ({})", node.id, node.kind);
        self.logger.node_state(&node.id, NodeState::Running);

        if node.kind == NodeKind::Agent {
            self.ctx.resources = self.graph.attached_resources(&node.id);
        }
        let result = handlers::dispatch(node, &mut self.ctx, self.services).await;
        self.ctx.resources = Resources::default();

        match result {
            Ok(outcome) => {
                self.ctx.current_value = outcome.value.clone();
                let mut entry =
                    ExecutionLogEntry::new(node, input, outcome.value.clone(), started.elapsed());
                if let Some(branch) = outcome.branch {
                    entry = entry.with_branch(branch.to_string());
                }
                self.logger.record(entry);
                self.logger.node_state(&node.id, NodeState::Completed);
                Ok(outcome)
            }
            Err(e) if !e.is_fatal() => {
                log::warn!("Node '{}' failed, continuing: {}", node.id, e);
                let entry = ExecutionLogEntry::new(node, input.clone(), input, started.elapsed())
                    .with_error(e.to_string());
                self.logger.record(entry);
                self.logger.node_state(&node.id, NodeState::Completed);
                Ok(NodeOutcome::value(self.ctx.current_value.clone()))
            }
            Err(e) => {
                log::error!("Node '{}' failed: {}", node.id, e);
                let entry = ExecutionLogEntry::new(node, input, Value::Null, started.elapsed())
                    .with_error(e.to_string());
                self.logger.record(entry);
                self.logger.node_state(&node.id, NodeState::Failed);
                Err(self.fail(e, Some(node.id.as_str())))
            }
        }
    }

    /// Control reached a loop node: start it, continue it, or unwind to it
    fn enter_loop(&mut self, node: &'g Node) -> Result<Option<&'g str>, ExecutionFailure> {
        if let Some(depth) = self.frames.iter().position(|f| f.node.id == node.id) {
            // Back at an active loop; close any loops nested inside it
            while self.frames.len() > depth + 1 {
                self.exit_loop();
            }
            return self.check_loop();
        }

        let settings = LoopSettings::from_node(node, self.services.config.max_loop_iterations)
            .map_err(|e| self.fail(e, Some(node.id.as_str())))?;
        if let Some(parent) = self.frames.last_mut() {
            parent.visited.insert(node.id.as_str());
        }

        log::info!(
            "Entering loop '{}' (max {} iterations)",
            node.id,
            settings.max_iterations
        );
        self.logger.node_state(&node.id, NodeState::Running);
        self.frames.push(LoopFrame {
            node,
            settings,
            iterations: 0,
            started: Instant::now(),
            input: self.ctx.current_value.clone(),
            visited: HashSet::new(),
        });
        self.check_loop()
    }

    /// Decide whether the innermost loop runs another iteration
    fn check_loop(&mut self) -> Result<Option<&'g str>, ExecutionFailure> {
        let Some(frame) = self.frames.last() else {
            return Ok(None);
        };
        let node = frame.node;

        if frame.iterations >= frame.settings.max_iterations {
            let limit = FlowError::LoopSafety {
                limit: frame.settings.max_iterations,
            };
            log::warn!("Loop '{}' stopped: {}", node.id, limit);
            return Ok(self.exit_loop());
        }

        let Some(body) = self.router.loop_body(node) else {
            log::warn!("Loop '{}' has no body edge", node.id);
            return Ok(self.exit_loop());
        };

        match frame
            .settings
            .should_continue(&self.ctx, self.services.evaluator.as_ref())
        {
            Ok(true) => {}
            Ok(false) => {
                log::info!(
                    "Loop '{}' condition false after {} iterations",
                    node.id,
                    frame.iterations
                );
                return Ok(self.exit_loop());
            }
            Err(e) => {
                log::warn!("Loop '{}' condition failed, exiting: {}", node.id, e);
                return Ok(self.exit_loop());
            }
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.iterations += 1;
            frame.visited.clear();
            log::info!(
                "Loop '{}' iteration {}/{}",
                node.id,
                frame.iterations,
                frame.settings.max_iterations
            );
        }
        Ok(Some(body))
    }

    /// Pop the innermost loop, log it and return where control goes next
    fn exit_loop(&mut self) -> Option<&'g str> {
        let frame = self.frames.pop()?;
        let entry = ExecutionLogEntry::new(
            frame.node,
            frame.input,
            self.ctx.current_value.clone(),
            frame.started.elapsed(),
        )
        .with_branch("exit");
        self.logger.record(entry);
        self.logger.node_state(&frame.node.id, NodeState::Completed);
        self.router.loop_exit(frame.node)
    }

    fn finish(self) -> ExecutionResult {
        log::info!(
            "Workflow completed after {} node executions",
            self.logger.len()
        );
        ExecutionResult {
            result: self.ctx.current_value,
            state: self.ctx.state.to_json(),
            log: self.logger.into_entries(),
        }
    }

    fn fail(&mut self, error: FlowError, node_id: Option<&str>) -> ExecutionFailure {
        ExecutionFailure {
            error,
            node_id: node_id.map(str::to_string),
            log: std::mem::take(&mut self.logger).into_entries(),
        }
    }
}
