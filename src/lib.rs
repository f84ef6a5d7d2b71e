//! Keel - Redis-speaking key-value node for consensus-replicated clusters.
//!
//! Keel exposes a subset of Redis commands over RESP and applies every write
//! deterministically through a replication adapter, so a cluster of nodes
//! driven by the same log converges on the same ordered key-value state.
//! Full state can be serialized into a portable snapshot stream for
//! late-joining or recovering replicas.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Redis Clients (RESP)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────┐
//! │            TCP Server + RESP Codec (net, protocol)          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 State Machine (machine)                     │
//! │   dispatch │ arity checks │ rw-lock discipline │ replies    │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                          │
//! ┌────────────────────────────┐ ┌────────────────────────────┐
//! │ Replication (replication)  │ │  Embedded Store (store)    │
//! │  applier contract + log    │ │  ordered KV over redb      │
//! └────────────────────────────┘ └────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and RESP mapping
//! - [`protocol`] - RESP values, parser, encoder
//! - [`store`] - Embedded ordered store adapter and key namespace codec
//! - [`machine`] - Command semantics, lifecycle, pattern scans, snapshots
//! - [`replication`] - Applier contract and built-in single-node log
//! - [`net`] - TCP listener and connection handling
//! - [`cli`] - Command-line interface
//!
//! # Durability model
//!
//! The store runs with relaxed durability (no fsync on write transactions).
//! That is safe only because the replication log is the durability
//! authority: committed entries are replayed on startup. A deployment that
//! removes the log must flip the store's sync policy.

pub mod cli;
pub mod core;
pub mod machine;
pub mod net;
pub mod protocol;
pub mod replication;
pub mod store;
