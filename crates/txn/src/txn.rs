//! Snapshot-isolated transactions
//!
//! A READ transaction pins one store snapshot from begin to end; every
//! read resolves against that snapshot. A READ_WRITE transaction also
//! pins its begin-time snapshot and buffers every put in a private
//! staging index; commit drains the staging index in key order into a
//! single atomic store batch. Abort (or drop) releases everything and
//! mutates nothing.
//!
//! Nested transactions are reserved: beginning one works and layers
//! the staging index, but committing a transaction that has a parent
//! fails with `Panic` until child merge lands.

use crate::cursor::{Cursor, PersistCursor, WriteFlags};
use crate::env::Environment;
use crate::staging::{SiCursor, StagingTree};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use varve_core::{Error, Result};
use varve_storage::{Snapshot, WriteBatch};

bitflags::bitflags! {
    /// Transaction begin flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxnFlags: u32 {
        /// Snapshot reads only; no staging index, no writes.
        const RDONLY = 1 << 0;
    }
}

/// One transaction against an [`Environment`]
///
/// Dropping a transaction aborts it. Cursors opened from a transaction
/// should be dropped before the transaction ends; the implicit default
/// cursor is managed by the transaction itself.
pub struct Txn {
    env: Environment,
    flags: TxnFlags,
    nested: bool,
    snapshot: Option<Snapshot>,
    staging: Option<Arc<Mutex<StagingTree>>>,
    default_cursor: Option<Cursor>,
}

impl Txn {
    /// Begin a transaction. A READ transaction takes its snapshot
    /// eagerly; a READ_WRITE transaction additionally allocates a
    /// fresh staging index (layered over `parent`'s when nested).
    pub fn begin(env: &Environment, parent: Option<&Txn>, flags: TxnFlags) -> Result<Txn> {
        let read_only = flags.contains(TxnFlags::RDONLY);
        if !read_only && env.inner.read_only {
            return Err(Error::Access("environment is read-only"));
        }

        let staging = if read_only {
            None
        } else {
            let arena = Arc::clone(&env.inner.arena);
            let cmp = Arc::clone(&env.inner.cmp);
            let tree = match parent.and_then(|p| p.staging.as_ref()) {
                Some(parent_tree) => {
                    let guard = parent_tree.lock();
                    StagingTree::begin(arena, cmp, Some(&*guard))
                }
                None => StagingTree::begin(arena, cmp, None),
            };
            Some(Arc::new(Mutex::new(tree)))
        };

        let mut txn = Txn {
            env: env.clone(),
            flags,
            nested: parent.is_some(),
            snapshot: None,
            staging,
            default_cursor: None,
        };
        if read_only {
            txn.renew()?;
        } else {
            txn.snapshot = Some(env.inner.store.snapshot());
        }
        Ok(txn)
    }

    /// Commit the transaction.
    ///
    /// READ: releases the snapshot and succeeds. READ_WRITE: drains the
    /// staging index in comparator order into one store batch and
    /// writes it under the environment's sync policy; on failure the
    /// transaction is gone and the store is unchanged.
    pub fn commit(self) -> Result<()> {
        if self.flags.contains(TxnFlags::RDONLY) {
            return Ok(());
        }
        if self.nested {
            return Err(Error::Panic("commit of a nested write transaction"));
        }
        let staging = match &self.staging {
            Some(tree) => tree,
            None => return Err(Error::Panic("write transaction without a staging index")),
        };

        let mut batch = WriteBatch::new();
        staging.lock().drain_ordered(|k, v| batch.put(k, v));
        let writes = batch.len();
        self.env
            .inner
            .store
            .write(&batch, self.env.inner.sync_writes)?;
        debug!(writes, "transaction committed");
        Ok(())
    }

    /// Abort the transaction: release the snapshot, discard the
    /// staging index, touch nothing durable. Dropping does the same.
    pub fn abort(self) {}

    /// Release the snapshot but keep the shell for [`Txn::renew`].
    /// READ transactions only.
    pub fn reset(&mut self) -> Result<()> {
        if !self.flags.contains(TxnFlags::RDONLY) {
            return Err(Error::Invalid("reset requires a read-only transaction"));
        }
        self.snapshot = None;
        self.default_cursor = None;
        Ok(())
    }

    /// Acquire a fresh snapshot in a reset shell. READ transactions
    /// only; fails when a snapshot is already held.
    pub fn renew(&mut self) -> Result<()> {
        if !self.flags.contains(TxnFlags::RDONLY) {
            return Err(Error::Invalid("renew requires a read-only transaction"));
        }
        if self.snapshot.is_some() {
            return Err(Error::Invalid("transaction already holds a snapshot"));
        }
        self.snapshot = Some(self.env.inner.store.snapshot());
        Ok(())
    }

    /// The flags this transaction was begun with.
    pub fn get_flags(&self) -> TxnFlags {
        self.flags
    }

    /// Compare two keys under the environment's comparator.
    pub fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.env.inner.cmp.compare(a, b)
    }

    /// The implicit default cursor, created on first use and shared by
    /// subsequent calls until the transaction is reset.
    pub fn cursor(&mut self) -> Result<&mut Cursor> {
        if self.default_cursor.is_none() {
            let cursor = self.open_cursor()?;
            self.default_cursor = Some(cursor);
        }
        match &mut self.default_cursor {
            Some(cursor) => Ok(cursor),
            None => Err(Error::Panic("default cursor vanished")),
        }
    }

    /// Open an independent cursor over this transaction's view.
    pub fn open_cursor(&self) -> Result<Cursor> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(Error::Invalid("transaction holds no snapshot"))?;
        let cmp = Arc::clone(&self.env.inner.cmp);
        Ok(Cursor::new(
            self.staging.as_ref().map(|t| SiCursor::open(Arc::clone(t))),
            PersistCursor::new(self.env.inner.store.iter(snapshot), Arc::clone(&cmp)),
            cmp,
            !self.flags.contains(TxnFlags::RDONLY),
        ))
    }

    /// Point lookup: the staged value if any, else the snapshot value.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if let Some(tree) = &self.staging {
            if let Some(v) = tree.lock().get(key) {
                return Ok(v);
            }
        }
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(Error::Invalid("transaction holds no snapshot"))?;
        self.env
            .inner
            .store
            .get(snapshot, key)
            .map(|v| v.to_vec())
    }

    /// Stage a put without touching any cursor position.
    pub fn put(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<()> {
        let tree = match &self.staging {
            Some(tree) => tree,
            None => return Err(Error::Access("read-only transaction")),
        };
        if flags.contains(WriteFlags::NOOVERWRITE) {
            match self.get(key) {
                Ok(_) => return Err(Error::KeyExist),
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        tree.lock().put(key, value)
    }
}
