//! Snapshot command implementation.
//!
//! Offline tooling over the snapshot stream format: dump a store into a
//! stream, rebuild a store from one, or project one into replayable RESP
//! `SET` commands.

use crate::machine::snapshot::snapshot_to_commands;
use crate::machine::Machine;
use crate::store::StoreOptions;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Snapshot operations.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

/// Snapshot subcommands.
#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Write a snapshot stream of an offline store.
    Dump {
        /// Store directory.
        #[arg(short, long, default_value = "data/node")]
        data_dir: PathBuf,
        /// Destination stream file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Rebuild an offline store from a snapshot stream.
    Restore {
        /// Source stream file.
        path: PathBuf,
        /// Store directory.
        #[arg(short, long, default_value = "data/node")]
        data_dir: PathBuf,
    },
    /// Project a snapshot stream into RESP SET commands.
    Convert {
        /// Source stream file.
        path: PathBuf,
        /// Destination file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the snapshot command.
pub fn run_snapshot(args: SnapshotArgs) -> Result<()> {
    match args.command {
        SnapshotCommand::Dump { data_dir, output } => {
            let machine = Machine::open(&data_dir, StoreOptions::default())
                .context("failed to open store")?;
            let file = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut writer = BufWriter::new(file);
            machine
                .snapshot(&mut writer)
                .context("failed to write snapshot")?;
            writer.flush().context("failed to flush snapshot")?;
            machine.close().context("failed to close store")?;
        }
        SnapshotCommand::Restore { path, data_dir } => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let machine = Machine::open(&data_dir, StoreOptions::default())
                .context("failed to open store")?;
            machine
                .restore(BufReader::new(file))
                .context("failed to restore snapshot")?;
            machine.close().context("failed to close store")?;
        }
        SnapshotCommand::Convert { path, output } => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let reader = BufReader::new(file);
            match output {
                Some(output) => {
                    let out = File::create(&output)
                        .with_context(|| format!("failed to create {}", output.display()))?;
                    let mut writer = BufWriter::new(out);
                    snapshot_to_commands(reader, &mut writer)
                        .context("failed to project snapshot")?;
                    writer.flush().context("failed to flush output")?;
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut writer = BufWriter::new(stdout.lock());
                    snapshot_to_commands(reader, &mut writer)
                        .context("failed to project snapshot")?;
                    writer.flush().context("failed to flush output")?;
                }
            }
        }
    }
    Ok(())
}
