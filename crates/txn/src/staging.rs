//! Staging index: the in-memory write buffer of a READ_WRITE txn
//!
//! Every write transaction stages its puts here and never touches the
//! persistent store until commit. The key map is an ordered map under
//! the environment comparator; the value bytes go to a shared append
//! arena with a write-through memory mapping over the unlinked backing
//! file, so staged data occupies reclaimable storage rather than heap.
//!
//! Trees support one level of layering: `begin` with a parent clones
//! the parent's entries, `commit_into` publishes them back, and
//! dropping the child discards them. The transaction layer does not
//! commit nested writers yet, but the shape is here for it.

use memmap2::MmapMut;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::ops::Bound;
use std::sync::Arc;
use tracing::trace;
use varve_core::{Comparator, Error, OrdKey, Result};

const ARENA_INITIAL: u64 = 64 * 1024;

/// Shared append arena over the unlinked staging file.
pub(crate) struct StagingArena {
    map: MmapMut,
    file: File,
    len: u64,
    writers: usize,
}

impl StagingArena {
    pub(crate) fn new(file: File) -> Result<StagingArena> {
        file.set_len(ARENA_INITIAL)?;
        // SAFETY: the file was just created and unlinked; this process
        // holds the only handle, so no other mapping can alias it.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(StagingArena {
            map,
            file,
            len: 0,
            writers: 0,
        })
    }

    fn grow(&mut self, need: u64) -> Result<()> {
        let mut cap = self.map.len() as u64;
        while cap < need {
            cap *= 2;
        }
        self.file.set_len(cap)?;
        // SAFETY: same single-handle file as in `new`; the old mapping
        // is replaced before anyone reads past the previous length.
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<(u64, u32)> {
        let off = self.len;
        let end = off + bytes.len() as u64;
        if end > self.map.len() as u64 {
            self.grow(end)?;
        }
        self.map[off as usize..end as usize].copy_from_slice(bytes);
        self.len = end;
        Ok((off, bytes.len() as u32))
    }

    pub(crate) fn read(&self, off: u64, len: u32) -> Vec<u8> {
        self.map[off as usize..(off + u64::from(len)) as usize].to_vec()
    }

    fn writer_opened(&mut self) {
        self.writers += 1;
    }

    fn writer_closed(&mut self) {
        self.writers -= 1;
        if self.writers == 0 {
            trace!(reclaimed = self.len, "staging arena reset");
            self.len = 0;
        }
    }
}

#[derive(Clone, Copy)]
struct ValRef {
    off: u64,
    len: u32,
}

/// The ordered staged-write map of one READ_WRITE transaction.
pub(crate) struct StagingTree {
    arena: Arc<Mutex<StagingArena>>,
    entries: BTreeMap<OrdKey, ValRef>,
    cmp: Arc<dyn Comparator>,
}

impl StagingTree {
    /// Open a fresh tree, or a nested layer over `parent`.
    pub(crate) fn begin(
        arena: Arc<Mutex<StagingArena>>,
        cmp: Arc<dyn Comparator>,
        parent: Option<&StagingTree>,
    ) -> StagingTree {
        arena.lock().writer_opened();
        StagingTree {
            entries: parent.map(|p| p.entries.clone()).unwrap_or_default(),
            arena,
            cmp,
        }
    }

    /// Stage a put. Last write wins within the transaction.
    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let vref = {
            let mut arena = self.arena.lock();
            let (off, len) = arena.append(value)?;
            ValRef { off, len }
        };
        self.entries.insert(OrdKey::new(key, &self.cmp), vref);
        Ok(())
    }

    /// Read a staged value back.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .get(&OrdKey::new(key, &self.cmp))
            .map(|v| self.arena.lock().read(v.off, v.len))
    }

    /// Publish a child layer's entries into this tree.
    pub(crate) fn commit_from(&mut self, child: StagingTree) {
        self.entries = child.entries.clone();
    }

    /// Number of distinct staged keys.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drain every staged entry in comparator order.
    pub(crate) fn drain_ordered(&self, mut f: impl FnMut(&[u8], &[u8])) {
        let arena = self.arena.lock();
        for (k, v) in &self.entries {
            f(k.bytes(), &arena.read(v.off, v.len));
        }
    }

    fn value(&self, vref: ValRef) -> Vec<u8> {
        self.arena.lock().read(vref.off, vref.len)
    }
}

impl Drop for StagingTree {
    fn drop(&mut self) {
        self.arena.lock().writer_closed();
    }
}

/// Positioning operations on a staging cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SiOp {
    /// Exact match.
    Set,
    /// First key at or after the probe.
    SetRange,
    First,
    Last,
    Next,
    Prev,
    /// Re-read the entry under the current position.
    GetCurrent,
}

/// A cursor over one staging tree
///
/// The position is the current key, re-resolved against the map on
/// each call, so cursors stay coherent across puts to the same tree.
pub(crate) struct SiCursor {
    tree: Arc<Mutex<StagingTree>>,
    pos: Option<OrdKey>,
}

impl SiCursor {
    pub(crate) fn open(tree: Arc<Mutex<StagingTree>>) -> SiCursor {
        SiCursor { tree, pos: None }
    }

    pub(crate) fn tree(&self) -> &Arc<Mutex<StagingTree>> {
        &self.tree
    }

    /// Force the position, used after a put lands on a key.
    pub(crate) fn set_pos(&mut self, key: &[u8]) {
        let tree = self.tree.lock();
        self.pos = Some(OrdKey::new(key, &tree.cmp));
    }

    /// Position per `op` and return the entry there.
    pub(crate) fn get(&mut self, key: Option<&[u8]>, op: SiOp) -> Result<(Vec<u8>, Vec<u8>)> {
        let tree = self.tree.lock();
        let found = match op {
            SiOp::Set | SiOp::SetRange => {
                let key = key.ok_or(Error::Invalid("positioning op without key"))?;
                let probe = OrdKey::new(key, &tree.cmp);
                match op {
                    SiOp::Set => tree.entries.get_key_value(&probe),
                    _ => tree
                        .entries
                        .range((Bound::Included(probe), Bound::Unbounded))
                        .next(),
                }
            }
            SiOp::First => tree.entries.iter().next(),
            SiOp::Last => tree.entries.iter().next_back(),
            SiOp::Next => match &self.pos {
                None => tree.entries.iter().next(),
                Some(cur) => tree
                    .entries
                    .range((Bound::Excluded(cur.clone()), Bound::Unbounded))
                    .next(),
            },
            SiOp::Prev => match &self.pos {
                None => tree.entries.iter().next_back(),
                Some(cur) => tree
                    .entries
                    .range((Bound::Unbounded, Bound::Excluded(cur.clone())))
                    .next_back(),
            },
            SiOp::GetCurrent => self.pos.as_ref().and_then(|p| tree.entries.get_key_value(p)),
        };
        match found {
            Some((k, v)) => {
                let out = (k.bytes().to_vec(), tree.value(*v));
                if op != SiOp::GetCurrent {
                    self.pos = Some(k.clone());
                }
                Ok(out)
            }
            None => {
                if op != SiOp::GetCurrent {
                    self.pos = None;
                }
                Err(Error::NotFound)
            }
        }
    }
}
