//! Error types and RESP mapping.
//!
//! Keel distinguishes protocol errors (bad arity, unknown verbs, malformed
//! options), store errors bubbling up from the embedded store, snapshot
//! stream errors, and fatal lifecycle errors. The display strings for
//! `WrongArity` and `UnknownCommand` are part of the wire contract and are
//! surfaced to clients verbatim.

use crate::protocol::RespValue;
use crate::store::StoreError;
use thiserror::Error;

/// Node error conditions.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Command arrived with the wrong number of arguments. No store
    /// interaction happens for these.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// Verb is not part of the command set.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Malformed command options (unknown KEYS option, missing option
    /// argument, non-integer LIMIT).
    #[error("syntax error")]
    Syntax,

    /// Malformed wire frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The machine has been closed; no further commands are served.
    #[error("node is closed")]
    Closed,

    /// Error from the embedded store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A snapshot stream ended in the middle of a record.
    #[error("snapshot stream truncated inside a record")]
    TruncatedSnapshot,

    /// I/O error outside the store (snapshot streams, replication log).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable condition: the store could not be reinitialized and no
    /// consistent local state remains. The lifecycle owner must abort.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl NodeError {
    /// Render this error as a RESP error reply.
    pub fn to_resp(&self) -> RespValue {
        RespValue::Error(format!("ERR {}", self))
    }

    /// Whether this error leaves the node without usable local state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Result type using NodeError.
pub type NodeResult<T> = Result<T, NodeError>;
