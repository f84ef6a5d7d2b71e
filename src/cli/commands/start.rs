//! Start command implementation.

use crate::core::config::{Config, Consistency, Durability, LogBackend};
use crate::machine::Machine;
use crate::net::Server;
use crate::replication::{Applier, LogApplier, LogOptions};
use crate::store::StoreOptions;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Start the node.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Bind address override.
    #[arg(long)]
    pub bind: Option<String>,

    /// Cluster join address override.
    #[arg(long)]
    pub join: Option<String>,

    /// Store directory override.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Replication log directory override.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Replication log durability level override.
    #[arg(long)]
    pub durability: Option<Durability>,

    /// Read consistency level override.
    #[arg(long)]
    pub consistency: Option<Consistency>,

    /// Replication log backend override.
    #[arg(long)]
    pub log_backend: Option<LogBackend>,
}

/// Initialize the tracing subscriber.
fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Merge CLI overrides into the loaded configuration.
fn apply_overrides(mut config: Config, args: &StartArgs) -> Config {
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(join) = &args.join {
        config.join = Some(join.clone());
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    if let Some(durability) = args.durability {
        config.durability = durability;
    }
    if let Some(consistency) = args.consistency {
        config.consistency = consistency;
    }
    if let Some(log_backend) = args.log_backend {
        config.log_backend = log_backend;
    }
    config
}

/// Run the start command.
pub async fn run_start(
    args: StartArgs,
    config_path: Option<&Path>,
    log_level: Option<&str>,
) -> Result<()> {
    init_tracing(log_level);

    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = apply_overrides(config, &args);
    config.validate()?;

    let bind = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;

    let machine = Arc::new(
        Machine::open(&config.data_dir, StoreOptions::default())
            .context("failed to open state machine")?,
    );

    let applier = LogApplier::open(LogOptions {
        backend: config.log_backend,
        dir: config.log_dir.clone(),
        durability: config.durability,
        consistency: config.consistency,
    })
    .context("failed to open replication log")?;
    applier
        .replay(&machine)
        .context("failed to replay replication log")?;
    let applier: Arc<dyn Applier> = Arc::new(applier);

    if let Some(join) = &config.join {
        info!(%join, "join address configured; single-node applier ignores it");
    }

    let server = Server::new(Arc::clone(&machine), applier, bind);

    // Serve until SHUTDOWN, a fatal store failure, or an OS signal.
    let mut shutdown = machine.shutdown_signal();
    tokio::select! {
        result = server.run() => {
            result.context("server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
        _ = shutdown.changed() => {}
    }

    if let Err(e) = machine.close() {
        error!(error = %e, "close failed");
    }
    Ok(())
}
