//! The replicated key-value state machine.
//!
//! [`Machine`] owns the store handle and executes commands deterministically
//! under a readers-writer lock: mutate closures run with the exclusive lock,
//! read/respond closures with the shared lock. Every command is routed
//! through a replication [`Applier`]; the applier decides how writes reach
//! the log and how read consistency is enforced.
//!
//! # Modules
//!
//! - [`strings`] - ECHO, SET, MSET, GET, MGET
//! - [`keys`] - DEL, DELIF, PDEL, KEYS
//! - [`server`] - FLUSHDB, SHUTDOWN
//! - [`pattern`] - Glob matching and scan bounds
//! - [`snapshot`] - Snapshot stream codec and command projection

pub mod keys;
pub mod pattern;
pub mod server;
pub mod snapshot;
pub mod strings;

use crate::core::error::{NodeError, NodeResult};
use crate::protocol::{Command, RespValue};
use crate::replication::{Applier, DirectApplier};
use crate::store::{Store, StoreOptions, STORE_FILE};
use parking_lot::RwLock;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// The key-value state machine.
pub struct Machine {
    state: RwLock<MachineState>,
    dir: PathBuf,
    options: StoreOptions,
    shutdown: watch::Sender<bool>,
}

pub(crate) struct MachineState {
    store: Option<Store>,
    closed: bool,
}

impl MachineState {
    /// The live store handle, or [`NodeError::Closed`].
    pub(crate) fn store(&self) -> NodeResult<&Store> {
        self.store.as_ref().ok_or(NodeError::Closed)
    }
}

impl Machine {
    /// Open the machine, creating the store directory if absent.
    pub fn open(dir: impl Into<PathBuf>, options: StoreOptions) -> NodeResult<Self> {
        let dir = dir.into();
        let store = Store::open(&dir, options)?;
        let (shutdown, _) = watch::channel(false);
        info!(dir = %dir.display(), "opened state machine");
        Ok(Self {
            state: RwLock::new(MachineState {
                store: Some(store),
                closed: false,
            }),
            dir,
            options,
            shutdown,
        })
    }

    /// Directory holding the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Subscribe to the node's shutdown signal. Fired by the SHUTDOWN
    /// command and by fatal lifecycle failures; the lifecycle owner decides
    /// how to terminate.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Close the machine. Subsequent commands fail with `node is closed`.
    pub fn close(&self) -> NodeResult<()> {
        let mut state = self.state.write();
        state.store = None;
        state.closed = true;
        info!("closed state machine");
        Ok(())
    }

    /// Whether the machine has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Dispatch one command through `applier`.
    pub fn command(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        match cmd.name() {
            "echo" => self.cmd_echo(cmd),
            "set" => self.cmd_set(applier, cmd),
            "mset" => self.cmd_mset(applier, cmd),
            "get" => self.cmd_get(applier, cmd),
            "mget" => self.cmd_mget(applier, cmd),
            "del" => self.cmd_del(applier, cmd, false),
            "delif" => self.cmd_del(applier, cmd, true),
            "pdel" => self.cmd_pdel(applier, cmd),
            "keys" => self.cmd_keys(applier, cmd),
            "flushdb" => self.cmd_flushdb(applier, cmd),
            "shutdown" => self.cmd_shutdown(cmd),
            other => {
                warn!(command = other, "unknown command");
                Err(NodeError::UnknownCommand(other.to_string()))
            }
        }
    }

    /// Re-execute a logged write during replay, discarding the reply.
    pub fn apply_logged(&self, cmd: &Command) -> NodeResult<()> {
        self.command(&DirectApplier, cmd).map(|_| ())
    }

    /// Serialize the full store state into `writer` as a snapshot stream.
    ///
    /// Holds the shared lock and a store-level read snapshot, so concurrent
    /// writes are not observed.
    pub fn snapshot<W: Write>(&self, writer: W) -> NodeResult<()> {
        let state = self.state.read();
        let store = state.store()?;
        let snap = store.snapshot()?;
        snapshot::write_snapshot(&snap, writer)
    }

    /// Rebuild the store from a snapshot stream.
    ///
    /// The current handle is closed, the backing file deleted, and a fresh
    /// store populated from `reader` under the exclusive lock.
    pub fn restore<R: Read>(&self, reader: R) -> NodeResult<()> {
        let mut state = self.state.write();
        self.reinit_locked(&mut state)?;
        let result = snapshot::read_snapshot(reader, state.store()?);
        if result.is_ok() {
            info!("restored store from snapshot");
        }
        result
    }

    /// Replace the store handle: close, delete the backing file, reopen with
    /// identical options. A failure here is unrecoverable; the machine marks
    /// itself closed and fires the shutdown signal so the lifecycle owner
    /// aborts.
    pub(crate) fn reinit_locked(&self, state: &mut MachineState) -> NodeResult<()> {
        if state.closed {
            return Err(NodeError::Closed);
        }
        state.store = None;

        let reopened = (|| -> NodeResult<Store> {
            let path = self.dir.join(STORE_FILE);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            Ok(Store::open(&self.dir, self.options)?)
        })();

        match reopened {
            Ok(store) => {
                state.store = Some(store);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "store reinitialize failed; no consistent local state remains");
                state.closed = true;
                self.signal_shutdown();
                Err(NodeError::Fatal(format!("store reinitialize failed: {}", e)))
            }
        }
    }

    pub(crate) fn state(&self) -> &RwLock<MachineState> {
        &self.state
    }
}

/// The arity error for `cmd`, named after its verb.
pub(crate) fn wrong_arity(cmd: &Command) -> NodeError {
    NodeError::WrongArity(cmd.name().to_string())
}
