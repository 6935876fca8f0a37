// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use flowkit_rs::adk::model::ollama::OllamaProvider;
use flowkit_rs::adk::model::LlmProvider;
use flowkit_rs::flowkit::collaborators::approval::ConsoleApproval;
use flowkit_rs::flowkit::collaborators::guardrail::RulesContentFilter;
use flowkit_rs::flowkit::collaborators::speech::HttpSpeechSynthesizer;
use flowkit_rs::flowkit::collaborators::Collaborators;
use flowkit_rs::flowkit::config::EngineConfig;
use flowkit_rs::flowkit::mcp::McpServiceManager;
use flowkit_rs::flowkit::server;
use flowkit_rs::flowkit::workflow::graph::{RunOptions, WorkflowExecutor};
use flowkit_rs::flowkit::workflow::load_graph;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, global = true, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow graph
    Run {
        /// Path to the graph file (JSON or YAML)
        #[arg(short, long)]
        file: PathBuf,

        /// Initial value handed to the start node
        #[arg(short, long, default_value = "")]
        input: String,

        /// Workflow variable as key=value (value may be JSON)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Model for agent nodes that do not name one
        #[arg(short, long)]
        model: Option<String>,

        /// Print the execution log as JSON
        #[arg(long)]
        log_json: bool,
    },
    /// Check a workflow graph without running it
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List models installed on the Ollama server
    Models,
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

fn parse_vars(vars: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut parsed = Map::new();
    for var in vars {
        let Some((key, raw)) = var.split_once('=') else {
            bail!("Invalid --var '{}', expected KEY=VALUE", var);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        parsed.insert(key.trim().to_string(), value);
    }
    Ok(parsed)
}

fn build_executor(
    config: EngineConfig,
    provider: Arc<dyn LlmProvider>,
    interactive: bool,
) -> anyhow::Result<WorkflowExecutor> {
    let mut collaborators = Collaborators::new()
        .with_content_filter(Arc::new(RulesContentFilter::default()))
        .with_mcp(Arc::new(McpServiceManager::new()));

    if interactive {
        collaborators = collaborators.with_approvals(Arc::new(ConsoleApproval));
    }

    if let Some(url) = &config.tts_url {
        let speech = HttpSpeechSynthesizer::new(url.clone(), config.request_timeout())
            .context("Failed to create speech client")?;
        log::info!("Voice output enabled via {}", url);
        collaborators = collaborators.with_speech(Arc::new(speech));
    }

    Ok(WorkflowExecutor::new(provider)
        .with_config(config)
        .with_collaborators(collaborators))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())
        .context("Failed to load engine configuration")?;
    if let Some(url) = args.ollama_url {
        config.ollama_url = url;
    }

    let ollama = Arc::new(
        OllamaProvider::new(config.ollama_url.clone(), config.request_timeout())
            .context("Failed to create Ollama client")?,
    );

    match args.command {
        Commands::Run {
            file,
            input,
            vars,
            model,
            log_json,
        } => {
            if model.is_some() {
                config.default_model = model;
            }
            let graph = load_graph(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let options = RunOptions {
                variables: parse_vars(&vars)?,
                ..Default::default()
            };

            let executor = build_executor(config, ollama, true)?;
            match executor
                .execute_with(&graph, Value::String(input), options)
                .await
            {
                Ok(result) => {
                    if log_json {
                        println!("{}", serde_json::to_string_pretty(&result.log)?);
                    }
                    match &result.result {
                        Value::String(text) => println!("{}", text),
                        other => println!("{}", serde_json::to_string_pretty(other)?),
                    }
                }
                Err(failure) => {
                    if log_json {
                        println!("{}", serde_json::to_string_pretty(&failure.log)?);
                    }
                    let node = failure.node_id.clone().unwrap_or_else(|| "-".to_string());
                    return Err(anyhow::Error::new(failure)
                        .context(format!("Workflow failed at node {}", node)));
                }
            }
        }
        Commands::Validate { file } => {
            let graph = load_graph(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            graph.validate()?;
            println!(
                "{}",
                json!({
                    "valid": true,
                    "nodes": graph.nodes.len(),
                    "edges": graph.edges.len(),
                })
            );
        }
        Commands::Models => {
            if !ollama.is_available().await {
                bail!("Ollama is not reachable at {}", ollama.base_url());
            }
            for model in ollama.list_models().await? {
                println!("{}", model.name);
            }
        }
        Commands::Serve { port } => {
            let executor = build_executor(config, ollama, false)?;
            server::serve(executor, port).await?;
        }
    }

    Ok(())
}
