//! Standalone Intelligent Executor service binary

use clap::Parser;
use noesis_core::bus::{MemoryBus, SharedBus};
use noesis_core::config::RuntimeConfig;
use noesis_core::llm::HttpLlmGateway;
use noesis_core::store::{MemoryStore, SharedStore};
use noesis_executor::executor::{ExecutorConfig, IntelligentExecutor};
use noesis_executor::http::{serve, ExecutorServiceState};
use noesis_executor::synthesis::CodeSynthesiser;
use noesis_goals::manager::GoalManager;
use noesis_sandbox::{ProcessSandbox, SharedSandbox};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "noesis-executord", about = "Noesis Intelligent Executor service")]
struct Args {
    /// Path to a TOML runtime config
    #[arg(long)]
    config: Option<String>,

    /// Override the HTTP bind address
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref())?;
    let addr = args
        .addr
        .unwrap_or_else(|| config.executor_http_addr.clone());

    let store: SharedStore = Arc::new(MemoryStore::new());
    let bus: SharedBus = Arc::new(MemoryBus::new());
    let sandbox: SharedSandbox = Arc::new(ProcessSandbox::new(config.sandbox_images.clone()));

    let mut gateway = HttpLlmGateway::new(&config.llm.base_url, &config.llm.model);
    if let Some(api_key) = &config.llm.api_key {
        gateway = gateway.with_api_key(api_key);
    }
    let synthesiser = CodeSynthesiser::new(
        Arc::new(gateway),
        Duration::from_secs(config.llm.timeout_secs),
    );

    let goals = Arc::new(GoalManager::new(store.clone(), bus.clone(), &config.agent_id));
    let executor = Arc::new(IntelligentExecutor::new(
        store,
        bus,
        sandbox,
        synthesiser,
        goals,
        ExecutorConfig {
            duplicate_window: config.duplicate_window(),
            exec_budget: config.exec_budget(),
            workflow_budget: config.workflow_budget(),
            retry_cap: config.retry_cap,
            concurrency_cap: config.concurrency_cap,
            ..Default::default()
        },
    ));

    serve(ExecutorServiceState { executor }, &addr).await
}
