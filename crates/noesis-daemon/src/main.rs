//! noesisd - the Noesis cognitive runtime daemon
//!
//! Wires every service loop over one shared store and bus:
//! input ingestion, goal synthesis, the Monitor Converter, the Goal
//! Manager HTTP surface, the Intelligent Executor with its goal
//! dispatcher, the explanation-learning feedback path, and the coherence
//! monitor. SIGINT stops the pollers before the HTTP servers.

use clap::{Parser, Subcommand};
use noesis_core::bus::{MemoryBus, SharedBus};
use noesis_core::coherence::{CoherenceConfig, CoherenceMonitor};
use noesis_core::config::RuntimeConfig;
use noesis_core::hypothesis::HypothesisEngine;
use noesis_core::ingest::InputIngestor;
use noesis_core::learning::FeedbackProcessor;
use noesis_core::llm::{HttpLlmGateway, SharedLlm};
use noesis_core::store::{MemoryStore, SharedStore};
use noesis_core::synthesis::{GoalSynthesiser, SynthesiserConfig};
use noesis_executor::dispatch::GoalDispatcher;
use noesis_executor::executor::{ExecutorConfig, IntelligentExecutor};
use noesis_executor::http as executor_http;
use noesis_executor::synthesis::CodeSynthesiser;
use noesis_goals::converter::{ConverterConfig, MonitorConverter};
use noesis_goals::http as goals_http;
use noesis_goals::manager::GoalManager;
use noesis_sandbox::{ProcessSandbox, SharedSandbox};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "noesisd", about = "Noesis cognitive runtime", version)]
struct Args {
    /// Path to a TOML runtime config
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every service loop in one process (default)
    Run,
    /// Run only the Goal Manager service and converter
    GoalService,
    /// Run only the Intelligent Executor service
    ExecutorService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref())?;
    tracing::info!(agent_id = %config.agent_id, "noesis starting");

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_all(config).await,
        Command::GoalService => run_goal_service(config).await,
        Command::ExecutorService => run_executor_service(config).await,
    }
}

struct Wiring {
    store: SharedStore,
    bus: SharedBus,
    llm: SharedLlm,
    sandbox: SharedSandbox,
}

fn wire(config: &RuntimeConfig) -> Wiring {
    let mut gateway = HttpLlmGateway::new(&config.llm.base_url, &config.llm.model);
    if let Some(api_key) = &config.llm.api_key {
        gateway = gateway.with_api_key(api_key);
    }
    Wiring {
        store: Arc::new(MemoryStore::new()),
        bus: Arc::new(MemoryBus::new()),
        llm: Arc::new(gateway),
        sandbox: Arc::new(ProcessSandbox::new(config.sandbox_images.clone())),
    }
}

async fn run_all(config: RuntimeConfig) -> anyhow::Result<()> {
    let w = wire(&config);
    let domains = config.domains.clone();

    let manager = Arc::new(GoalManager::new(
        w.store.clone(),
        w.bus.clone(),
        &config.agent_id,
    ));
    let engine = Arc::new(HypothesisEngine::new(
        w.store.clone(),
        w.bus.clone(),
        w.llm.clone(),
        &config.agent_id,
    ));
    let synthesiser = Arc::new(GoalSynthesiser::new(
        w.store.clone(),
        SynthesiserConfig {
            uncertainty_threshold: config.uncertainty_threshold,
            batch_cap: config.synthesiser_batch_cap,
            cooling_period: config.cooling_period(),
        },
    ));
    let executor = Arc::new(IntelligentExecutor::new(
        w.store.clone(),
        w.bus.clone(),
        w.sandbox.clone(),
        CodeSynthesiser::new(w.llm.clone(), Duration::from_secs(config.llm.timeout_secs)),
        manager.clone(),
        ExecutorConfig {
            duplicate_window: config.duplicate_window(),
            exec_budget: config.exec_budget(),
            workflow_budget: config.workflow_budget(),
            retry_cap: config.retry_cap,
            concurrency_cap: config.concurrency_cap,
            ..Default::default()
        },
    ));

    let mut loops = Vec::new();

    // Input ingestion.
    {
        let ingestor = InputIngestor::new(w.store.clone(), w.bus.clone());
        let engine = engine.clone();
        loops.push(tokio::spawn(async move {
            if let Err(e) = ingestor.run(&engine).await {
                tracing::error!(error = %e, "ingestor stopped");
            }
        }));
    }

    // Periodic goal synthesis over the knowledge slice.
    {
        let synthesiser = synthesiser.clone();
        let engine = engine.clone();
        let domains = domains.clone();
        let period = config.converter_period();
        loops.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match synthesiser.run_cycle(&engine, &domains).await {
                    Ok(seeds) if !seeds.is_empty() => {
                        tracing::info!(count = seeds.len(), "goal seeds emitted");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "synthesis cycle failed"),
                }
            }
        }));
    }

    // Monitor Converter.
    {
        let converter = MonitorConverter::new(
            w.store.clone(),
            ConverterConfig {
                period: config.converter_period(),
                ..Default::default()
            },
        );
        let manager = manager.clone();
        let domains = domains.clone();
        loops.push(tokio::spawn(async move {
            if let Err(e) = converter.run(&manager, &domains).await {
                tracing::error!(error = %e, "converter stopped");
            }
        }));
    }

    // Goal-triggered workflow dispatch.
    {
        let dispatcher = GoalDispatcher::new(w.bus.clone(), manager.clone(), executor.clone());
        loops.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run().await {
                tracing::error!(error = %e, "dispatcher stopped");
            }
        }));
    }

    // Explanation-learning feedback.
    {
        let feedback = FeedbackProcessor::new(
            w.store.clone(),
            w.bus.clone(),
            HypothesisEngine::new(
                w.store.clone(),
                w.bus.clone(),
                w.llm.clone(),
                &config.agent_id,
            ),
        );
        loops.push(tokio::spawn(async move {
            if let Err(e) = feedback.run().await {
                tracing::error!(error = %e, "feedback stopped");
            }
        }));
    }

    // Coherence monitor: scan loop plus resolution listener.
    {
        let monitor = Arc::new(CoherenceMonitor::new(
            w.store.clone(),
            w.bus.clone(),
            &config.agent_id,
            CoherenceConfig {
                period: config.coherence_period(),
                startup_delay: config.coherence_startup_delay(),
            },
        ));
        let scan_monitor = monitor.clone();
        let scan_engine = engine.clone();
        let scan_synthesiser = synthesiser.clone();
        let scan_domains = domains.clone();
        loops.push(tokio::spawn(async move {
            if let Err(e) = scan_monitor
                .run(&scan_engine, &scan_synthesiser, &scan_domains)
                .await
            {
                tracing::error!(error = %e, "coherence scan stopped");
            }
        }));
        loops.push(tokio::spawn(async move {
            if let Err(e) = monitor.run_resolution().await {
                tracing::error!(error = %e, "coherence resolution stopped");
            }
        }));
    }

    // HTTP surfaces.
    let goal_server = {
        let state = goals_http::GoalServiceState {
            manager: manager.clone(),
        };
        let addr = config.goal_http_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = goals_http::serve(state, &addr).await {
                tracing::error!(error = %e, "goal service stopped");
            }
        })
    };
    let executor_server = {
        let state = executor_http::ExecutorServiceState {
            executor: executor.clone(),
        };
        let addr = config.executor_http_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = executor_http::serve(state, &addr).await {
                tracing::error!(error = %e, "executor service stopped");
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping pollers");
    for handle in loops {
        handle.abort();
    }
    goal_server.abort();
    executor_server.abort();
    tracing::info!("noesis stopped");
    Ok(())
}

async fn run_goal_service(config: RuntimeConfig) -> anyhow::Result<()> {
    let w = wire(&config);
    let manager = Arc::new(GoalManager::new(w.store.clone(), w.bus, &config.agent_id));

    let converter = MonitorConverter::new(
        w.store,
        ConverterConfig {
            period: config.converter_period(),
            ..Default::default()
        },
    );
    let converter_manager = manager.clone();
    let domains = config.domains.clone();
    let poller = tokio::spawn(async move {
        if let Err(e) = converter.run(&converter_manager, &domains).await {
            tracing::error!(error = %e, "converter stopped");
        }
    });

    let result = goals_http::serve(
        goals_http::GoalServiceState { manager },
        &config.goal_http_addr,
    )
    .await;
    poller.abort();
    result
}

async fn run_executor_service(config: RuntimeConfig) -> anyhow::Result<()> {
    let w = wire(&config);
    let manager = Arc::new(GoalManager::new(
        w.store.clone(),
        w.bus.clone(),
        &config.agent_id,
    ));
    let executor = Arc::new(IntelligentExecutor::new(
        w.store,
        w.bus,
        w.sandbox,
        CodeSynthesiser::new(w.llm, Duration::from_secs(config.llm.timeout_secs)),
        manager,
        ExecutorConfig {
            duplicate_window: config.duplicate_window(),
            exec_budget: config.exec_budget(),
            workflow_budget: config.workflow_budget(),
            retry_cap: config.retry_cap,
            concurrency_cap: config.concurrency_cap,
            ..Default::default()
        },
    ));

    executor_http::serve(
        executor_http::ExecutorServiceState { executor },
        &config.executor_http_addr,
    )
    .await
}
