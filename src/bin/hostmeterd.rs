//! hostmeterd - host telemetry agent daemon.
//!
//! Samples host metrics with every active meter and writes min/max/avg
//! records to PostgreSQL until interrupted.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use hostmeter::collector::{MachineIdentity, RealFs};
use hostmeter::config::AgentConfig;
use hostmeter::storage::{Connector, MemoryStore, PgConnector};
use hostmeter::{MeterRegistry, Orchestrator};

/// Host telemetry agent daemon.
#[derive(Parser)]
#[command(name = "hostmeterd", about = "Host telemetry agent daemon", version)]
struct Args {
    /// Config file. Defaults to /etc/hostmeter/agent.toml, then ./etc/hostmeter/agent.toml.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Write to an in-memory store instead of the database.
    #[arg(long)]
    dry_run: bool,

    /// Path to /proc filesystem, overriding the config file.
    #[arg(long, value_name = "PATH")]
    proc_path: Option<String>,
}

/// Initializes the tracing subscriber. `-q` and `-v` win over the configured level.
fn init_logging(verbose: u8, quiet: bool, configured: &str) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => configured.parse().unwrap_or(Level::INFO),
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("hostmeter={},hostmeterd={}", level, level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = match &args.config {
        Some(path) => {
            let config = AgentConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config, Some(path.clone()))
        }
        None => AgentConfig::discover().context("loading configuration")?,
    };
    if let Some(proc_path) = args.proc_path {
        config.provider.proc_path = proc_path;
    }
    let dry_run = args.dry_run || config.settings.dry_run;

    init_logging(args.verbose, args.quiet, &config.log.level);
    info!("hostmeterd {} starting", env!("CARGO_PKG_VERSION"));
    match &source {
        Some(path) => info!(config = %path.display(), "configuration loaded"),
        None => warn!("no config file found, using defaults"),
    }

    let connector: Box<dyn Connector> = if dry_run {
        info!("dry run: records are kept in memory");
        Box::new(MemoryStore::new())
    } else {
        Box::new(PgConnector::new(config.database.clone()))
    };

    let paths = config.provider.clone();
    let registry = MeterRegistry::builtin(RealFs::new(), paths.clone());
    let identity = Box::new(MachineIdentity::new(RealFs::new(), paths));

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing signal handler")?;

    let mut orchestrator = Orchestrator::new(config, registry, connector, identity);
    orchestrator.start().context("starting meters")?;
    if let Some(host_id) = orchestrator.host_id() {
        info!(host_id, meters = orchestrator.meters().len(), "running");
    }

    let _ = stop_rx.recv();
    info!("Received shutdown signal");

    orchestrator.stop().context("stopping meters")?;
    info!("Shutdown complete");
    Ok(())
}
