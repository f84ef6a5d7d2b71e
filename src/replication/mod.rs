//! Replication adapter contract.
//!
//! Every command the machine executes flows through an [`Applier`]. Writes
//! carry a mutate closure that must run exactly once per replica, in log
//! order, after the entry is committed; the respond closure runs on the
//! originating replica and shapes the wire reply. Reads carry only a respond
//! closure, gated by the configured consistency level.
//!
//! The state machine treats the applier as a black box beyond this contract,
//! so an external consensus engine can stand in for the built-in
//! [`log::LogApplier`] without touching command code.
//!
//! # Modules
//!
//! - [`log`] - Built-in single-node command log applier

pub mod log;

use crate::core::error::NodeResult;
use crate::protocol::{Command, RespValue};

pub use log::{LogApplier, LogOptions};

/// Value produced by a mutate closure and handed to the respond closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The mutation carries no payload.
    Unit,
    /// A count of affected records.
    Count(usize),
}

impl Outcome {
    /// The count carried by this outcome, zero for [`Outcome::Unit`].
    pub fn count(&self) -> usize {
        match self {
            Self::Count(n) => *n,
            Self::Unit => 0,
        }
    }
}

/// Deterministic state mutation, run once per replica in log order.
pub type Mutate<'a> = Box<dyn FnOnce() -> NodeResult<Outcome> + 'a>;

/// Reply shaping, run on the originating replica after the mutation (or
/// directly, for reads).
pub type Respond<'a> = Box<dyn FnOnce(Outcome) -> NodeResult<RespValue> + 'a>;

/// The replication adapter contract.
pub trait Applier: Send + Sync {
    /// Apply a command.
    ///
    /// A `Some(mutate)` marks the command as a write: the adapter sequences
    /// it through the replication log, invokes `mutate`, then `respond` with
    /// the mutation's outcome. A `None` marks a read: the adapter enforces
    /// the configured read consistency and invokes `respond` with
    /// [`Outcome::Unit`].
    fn apply(
        &self,
        cmd: &Command,
        mutate: Option<Mutate<'_>>,
        respond: Respond<'_>,
    ) -> NodeResult<RespValue>;
}

/// Applier that executes commands in place without any log.
///
/// Used to replay logged commands at startup and by tests that exercise
/// machine semantics without replication.
#[derive(Debug, Default)]
pub struct DirectApplier;

impl Applier for DirectApplier {
    fn apply(
        &self,
        _cmd: &Command,
        mutate: Option<Mutate<'_>>,
        respond: Respond<'_>,
    ) -> NodeResult<RespValue> {
        match mutate {
            Some(mutate) => {
                let outcome = mutate()?;
                respond(outcome)
            }
            None => respond(Outcome::Unit),
        }
    }
}
