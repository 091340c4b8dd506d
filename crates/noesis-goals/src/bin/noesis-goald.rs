//! Standalone Goal Manager service binary
//!
//! Runs the Goal Manager HTTP surface and the Monitor Converter loop over
//! an in-memory store and bus. Split deployments against an external
//! store/bus configure the endpoints in the runtime config.

use clap::Parser;
use noesis_core::bus::{MemoryBus, SharedBus};
use noesis_core::config::RuntimeConfig;
use noesis_core::store::{MemoryStore, SharedStore};
use noesis_goals::converter::{ConverterConfig, MonitorConverter};
use noesis_goals::http::{serve, GoalServiceState};
use noesis_goals::manager::GoalManager;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "noesis-goald", about = "Noesis Goal Manager service")]
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
    let addr = args.addr.unwrap_or_else(|| config.goal_http_addr.clone());

    let store: SharedStore = Arc::new(MemoryStore::new());
    let bus: SharedBus = Arc::new(MemoryBus::new());
    let manager = Arc::new(GoalManager::new(store.clone(), bus, &config.agent_id));

    let converter = MonitorConverter::new(
        store,
        ConverterConfig {
            period: config.converter_period(),
            ..Default::default()
        },
    );
    let converter_manager = manager.clone();
    let domains = config.domains.clone();
    tokio::spawn(async move {
        if let Err(e) = converter.run(&converter_manager, &domains).await {
            tracing::error!(error = %e, "converter loop stopped");
        }
    });

    serve(GoalServiceState { manager }, &addr).await
}
