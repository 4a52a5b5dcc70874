use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use pbsflow::activities::{build_workflow_factories, Collaborators, DEFAULT_PIPELINE};
use pbsflow::config::EngineConfig;
use pbsflow::http::{build_router, AppState};
use pbsflow::logcapture::{CapturingLayer, LogCollector};
use pbsflow::metrics::Metrics;
use pbsflow::run_manager::RunManager;
use pbsflow::scheduler::TriggerManager;
use pbsflow::store::{DiskStore, StateStore};

#[derive(Parser)]
#[command(name = "pbsflow")]
#[command(version, about = "Power-cycled backup pipeline orchestrator for Proxmox Backup Server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the backup workflow followed by the power-off workflow once,
    /// then exits. Non-zero exit on any workflow failure.
    Run {
        #[arg(long)]
        config: std::path::PathBuf,
    },
    /// Runs the HTTP control plane and cron scheduler until signalled.
    Serve {
        #[arg(long)]
        config: std::path::PathBuf,
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

fn init_tracing(log_level: &str, log_collector: LogCollector) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pbsflow={log_level},tower_http=info").into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(CapturingLayer::new(log_collector))
        .init();
}

fn build_run_manager(
    config: &EngineConfig,
    config_arc: Arc<ArcSwap<EngineConfig>>,
    metrics: Arc<Metrics>,
    log_collector: LogCollector,
) -> Result<Arc<RunManager>> {
    let store: Arc<dyn StateStore> = Arc::new(
        DiskStore::new(&config.state_dir, Some(200)).context("opening state store")?,
    );
    let factories = build_workflow_factories(config_arc, Collaborators::new());
    Ok(Arc::new(RunManager::with_metrics(factories, store, log_collector, metrics)))
}

async fn run_once(config_path: std::path::PathBuf) -> Result<()> {
    let config = EngineConfig::load(&config_path)?;
    let log_collector = LogCollector::new();
    init_tracing(&config.log_level, log_collector.clone());

    let config_arc = Arc::new(ArcSwap::new(Arc::new(config.clone())));
    let run_manager = build_run_manager(&config, config_arc, Arc::new(Metrics::new()), log_collector)?;

    let ctx = CancellationToken::new();
    let handle = run_manager
        .start(DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect(), ctx)
        .context("starting one-shot run")?;
    handle.await.context("one-shot run task panicked")?;

    let (summary, _activities) = run_manager.status().await?;
    match summary {
        Some(summary) if summary.error.is_some() => {
            anyhow::bail!("run {} failed: {}", summary.id, summary.error.unwrap())
        }
        Some(_) => Ok(()),
        None => anyhow::bail!("run manager reported no summary after a completed run"),
    }
}

async fn serve(config_path: std::path::PathBuf, listen_override: Option<SocketAddr>) -> Result<()> {
    let config = EngineConfig::load(&config_path)?;
    let log_collector = LogCollector::new();
    init_tracing(&config.log_level, log_collector.clone());

    let listen_addr: SocketAddr = match listen_override {
        Some(addr) => addr,
        None => config.listener.addr.parse().context("parsing listener.addr from config")?,
    };

    let config_arc = Arc::new(ArcSwap::new(Arc::new(config.clone())));
    let metrics = Arc::new(Metrics::new());
    let run_manager = build_run_manager(&config, config_arc.clone(), metrics.clone(), log_collector)?;

    let cron_entries: Vec<(String, Vec<String>)> = config
        .cron
        .iter()
        .map(|entry| (entry.schedule.clone(), entry.workflows.clone()))
        .collect();
    let triggers = Arc::new(
        TriggerManager::new(cron_entries, run_manager.clone()).context("building cron triggers")?,
    );

    let shutdown = CancellationToken::new();
    triggers.clone().start(shutdown.clone());

    let state = AppState {
        config: config_arc,
        config_path: config_path.clone(),
        run_manager,
        triggers,
        metrics,
        build: pbsflow::http::state::BuildInfo::new(chrono::Utc::now()),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding control plane listener on {listen_addr}"))?;

    tracing::info!(addr = %listen_addr, "pbsflow control plane listening");

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_signal.cancel();
        })
        .await
        .context("control plane server error")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run_once(config).await,
        Commands::Serve { config, listen } => serve(config, listen).await,
    }
}
