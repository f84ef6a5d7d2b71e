//! Redis RESP protocol types.
//!
//! Keel speaks RESP2: arrays of bulk strings in, simple strings / errors /
//! integers / bulks / arrays / nulls out. This module holds the value and
//! command types; [`resp`] holds the streaming parser and encoder.

pub mod resp;

pub use resp::{encode, encode_to_vec, ParseResult, RespParser};

use crate::core::error::{NodeError, NodeResult};
use bytes::Bytes;

/// A RESP protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string (+OK\r\n).
    Simple(String),

    /// Error (-ERR message\r\n). The payload includes the error kind.
    Error(String),

    /// Integer (:1000\r\n).
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n).
    Bulk(Bytes),

    /// Array (*2\r\n...).
    Array(Vec<RespValue>),

    /// Null bulk ($-1\r\n).
    Null,
}

impl RespValue {
    /// Create an OK response.
    pub fn ok() -> Self {
        Self::Simple("OK".to_string())
    }

    /// Create a bulk string.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(data.into())
    }

    /// Create an array.
    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Simple(s) => Some(s.as_bytes()),
            Self::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// A parsed client command.
///
/// `argv` holds the full argument vector including the verb at index 0, so
/// argument counts match the wire frame one-to-one. The verb is lowercased
/// once at construction for dispatch.
#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    argv: Vec<Bytes>,
}

impl Command {
    /// Build a command from raw argument bytes. The first argument is the
    /// verb.
    pub fn new(argv: Vec<Bytes>) -> NodeResult<Self> {
        let verb = argv
            .first()
            .ok_or_else(|| NodeError::Protocol("empty command".to_string()))?;
        let name = std::str::from_utf8(verb)
            .map_err(|_| NodeError::Protocol("verb is not valid utf-8".to_string()))?
            .to_lowercase();
        Ok(Self { name, argv })
    }

    /// Build a command from a parsed RESP array.
    pub fn from_resp(value: RespValue) -> NodeResult<Self> {
        let values = match value {
            RespValue::Array(values) => values,
            _ => return Err(NodeError::Protocol("expected array frame".to_string())),
        };
        let argv = values
            .into_iter()
            .map(|v| match v {
                RespValue::Bulk(b) => Ok(b),
                RespValue::Simple(s) => Ok(Bytes::from(s)),
                RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                _ => Err(NodeError::Protocol(
                    "command arguments must be bulk strings".to_string(),
                )),
            })
            .collect::<NodeResult<Vec<_>>>()?;
        Self::new(argv)
    }

    /// The lowercased verb.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total argument count, verb included.
    pub fn argc(&self) -> usize {
        self.argv.len()
    }

    /// Argument at `index` (0 is the verb). Callers validate arity first.
    pub fn arg(&self, index: usize) -> &[u8] {
        &self.argv[index]
    }

    /// Arguments from `start` onward.
    pub fn args_from(&self, start: usize) -> &[Bytes] {
        &self.argv[start..]
    }

    /// Re-encode this command as a RESP array of bulk strings.
    pub fn to_resp(&self) -> RespValue {
        RespValue::Array(
            self.argv
                .iter()
                .map(|a| RespValue::Bulk(a.clone()))
                .collect(),
        )
    }
}
