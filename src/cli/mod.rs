//! Command-line interface.
//!
//! Unified CLI for node and snapshot operations.

pub mod commands;

use clap::{Parser, Subcommand};

/// Keel - Redis-speaking replicated key-value node.
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Start(commands::StartArgs),
    /// Snapshot operations.
    Snapshot(commands::SnapshotArgs),
}
