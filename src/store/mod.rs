//! Embedded store adapter.
//!
//! A thin facade over [redb] exposing exactly what the state machine needs:
//! point reads, atomic write batches, bounded scans in either direction, and
//! consistent read snapshots for the snapshot codec.
//!
//! The store is opened with durability relaxed: write transactions are not
//! fsynced before returning. This is safe only because the replication log
//! is the durability authority and replays committed entries after a crash.
//! A deployment that drops the log must flip [`StoreOptions::relaxed_durability`].
//!
//! # Modules
//!
//! - [`keys`] - Stored-key namespace codec

pub mod keys;

use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The single key-value table.
const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// File name of the store inside its directory.
pub const STORE_FILE: &str = "node.redb";

/// Store error conditions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("store error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("store error: {0}")]
    Table(#[from] redb::TableError),
    #[error("store error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("store error: {0}")]
    Commit(#[from] redb::CommitError),
}

/// Result type using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Open-options for the store. Kept by the owner so handle replacement
/// reopens with identical options.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Skip fsync on write transactions. The replication log provides
    /// durability.
    pub relaxed_durability: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            relaxed_durability: true,
        }
    }
}

/// A staged batch of writes, committed atomically by [`Store::write`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Embedded ordered key-value store.
pub struct Store {
    db: Database,
    path: PathBuf,
    options: StoreOptions,
}

impl Store {
    /// Open (or create) the store inside `dir`.
    pub fn open(dir: &Path, options: StoreOptions) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);
        let db = Database::create(&path)?;

        // Make sure the table exists so read transactions never race its
        // creation.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(KV_TABLE)?;
        }
        txn.commit()?;

        debug!(path = %path.display(), "opened store");
        Ok(Self { db, path, options })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point lookup. Returns an owned copy of the value.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV_TABLE)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Existence check without copying the value out.
    pub fn has(&self, key: &[u8]) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV_TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    /// Write a single record.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        self.write(batch)
    }

    /// Delete a single record.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key.to_vec());
        self.write(batch)
    }

    /// Commit a batch atomically. An empty batch is a no-op.
    pub fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut txn = self.db.begin_write()?;
        if self.options.relaxed_durability {
            txn.set_durability(redb::Durability::None);
        }
        {
            let mut table = txn.open_table(KV_TABLE)?;
            for op in &batch.ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_slice(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_slice())?;
                    }
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Visit records inside `[lo, hi)`-style bounds, ascending or
    /// descending. The visitor returns `false` to stop early. Borrowed
    /// key/value slices are only valid for the duration of one call; the
    /// visitor copies what it keeps.
    pub fn scan<F>(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
        mut visit: F,
    ) -> StoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> StoreResult<bool>,
    {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV_TABLE)?;
        let range = table.range::<&[u8]>((lower, upper))?;
        if reverse {
            for entry in range.rev() {
                let (key, value) = entry?;
                if !visit(key.value(), value.value())? {
                    break;
                }
            }
        } else {
            for entry in range {
                let (key, value) = entry?;
                if !visit(key.value(), value.value())? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Acquire a consistent read snapshot. The snapshot pins the store's
    /// state at the point of this call; concurrent writes are not observed.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV_TABLE)?;
        Ok(StoreSnapshot { _txn: txn, table })
    }
}

/// A consistent point-in-time view of the store.
pub struct StoreSnapshot {
    // The transaction is held only to pin the MVCC snapshot the table reads
    // from; dropping it releases the snapshot.
    _txn: ReadTransaction,
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl StoreSnapshot {
    /// Visit every record in ascending key order.
    pub fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        let range = self
            .table
            .range::<&[u8]>(..)
            .map_err(StoreError::from)?;
        for entry in range {
            let (key, value) = entry.map_err(StoreError::from)?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }
}
