//! Keel - unified CLI entrypoint.
//!
//! Usage:
//!   keel start [--config config/keel.toml] [--bind ADDR] [--data-dir DIR]
//!   keel snapshot dump --data-dir DIR --output FILE
//!   keel snapshot restore FILE --data-dir DIR
//!   keel snapshot convert FILE [--output FILE]

use anyhow::Result;
use clap::Parser;
use keel::cli::commands::{run_snapshot, run_start};
use keel::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => {
            run_start(args, config_path.as_deref(), cli.log_level.as_deref()).await
        }
        Commands::Snapshot(args) => run_snapshot(args),
    }
}
