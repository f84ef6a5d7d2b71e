//! Server command handlers: FLUSHDB, SHUTDOWN.

use super::{wrong_arity, Machine};
use crate::core::error::NodeResult;
use crate::protocol::{Command, RespValue};
use crate::replication::{Applier, Outcome};
use tracing::warn;

impl Machine {
    /// FLUSHDB - replace the store with an empty one: close the handle,
    /// delete the backing file, reopen with identical options. Reply OK.
    /// A reopen failure is fatal.
    pub(crate) fn cmd_flushdb(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 1 {
            return Err(wrong_arity(cmd));
        }
        applier.apply(
            cmd,
            Some(Box::new(move || {
                let mut state = self.state().write();
                self.reinit_locked(&mut state)?;
                Ok(Outcome::Unit)
            })),
            Box::new(|_| Ok(RespValue::ok())),
        )
    }

    /// SHUTDOWN - reply OK and fire the node's shutdown signal. Not
    /// replicated; the connection is closed by the caller and the lifecycle
    /// owner terminates the process.
    pub(crate) fn cmd_shutdown(&self, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 1 {
            return Err(wrong_arity(cmd));
        }
        warn!("shutting down");
        self.signal_shutdown();
        Ok(RespValue::ok())
    }
}
