//! Skein node entry point
//!
//! Loads a [`RuntimeConfig`], starts a dispatcher with its listeners and
//! remote actors, optionally hosts the demo echo actor, and runs until
//! Ctrl-C.

mod echo;

use actors::Dispatcher;
use anyhow::{Context, Result};
use clap::Parser;
use node_config::RuntimeConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::ActorId;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Worker threads, overrides the configuration file
    #[arg(short, long)]
    workers: Option<usize>,

    /// Host the echo actor under this id
    #[arg(long)]
    echo_id: Option<u32>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Skein node");

    let mut dispatcher = Dispatcher::from_config(&config).context("invalid runtime configuration")?;
    if let Some(id) = args.echo_id {
        dispatcher
            .register_actor(ActorId::new(id), echo::EchoService::default())
            .context("registering echo actor")?;
    }
    dispatcher
        .start(config.workers)
        .context("starting dispatcher")?;

    for (kind, addr) in dispatcher.listen_addresses() {
        info!(listener = kind.label(), listen_addr = %addr, "Accepting connections");
    }

    wait_for_ctrl_c()?;
    info!("Shutdown signal received");
    dispatcher.stop();
    Ok(())
}

fn wait_for_ctrl_c() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("installing Ctrl-C handler")
}
