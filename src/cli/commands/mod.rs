//! CLI command implementations.

pub mod snapshot;
pub mod start;

pub use snapshot::{run_snapshot, SnapshotArgs};
pub use start::{run_start, StartArgs};
