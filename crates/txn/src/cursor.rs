//! The merged cursor: one ordered stream over staged ∪ committed data
//!
//! Under a READ_WRITE transaction the cursor runs two sub-cursors, one
//! over the staging index and one over the store snapshot, and merges
//! them per operation. A state tag records which side produced the
//! current position:
//!
//! - `Invalid`: no current position (fresh, cleared, or exhausted)
//! - `Pending`: the staging side holds the position
//! - `Persist`: the snapshot side holds the position
//! - `Equal`: both sides sit on the same key; the staged value wins
//!
//! Under a READ transaction the staging side is permanently absent and
//! every operation resolves to the snapshot side through the same
//! merge rule.
//!
//! Directions are `+1` (ascending), `-1` (descending), and, for `seek`
//! only, `0` (exact match). The merge tie-break multiplies the
//! comparator result by the direction sign so reverse scans take the
//! greater key first.

use crate::staging::{SiCursor, SiOp};
use std::cmp::Ordering;
use std::sync::Arc;
use varve_core::{Comparator, Error, Range, Result};
use varve_storage::StoreIter;

bitflags::bitflags! {
    /// Write flags for [`Cursor::put`] and `Txn::put`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriteFlags: u32 {
        /// Fail with `KeyExist` instead of shadowing an existing key.
        const NOOVERWRITE = 1 << 0;
    }
}

/// Which side of the merge produced the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No current position.
    Invalid,
    /// Both sides are on the same key; the staged value shadows.
    Equal,
    /// The staging side holds the position.
    Pending,
    /// The snapshot side holds the position.
    Persist,
}

/// Direction-aware wrapper over the raw snapshot iterator
///
/// Gives the store iterator the same seek/first/next surface the
/// staging cursor has, so the merge logic treats both sides alike.
pub(crate) struct PersistCursor {
    iter: StoreIter,
    cmp: Arc<dyn Comparator>,
}

impl PersistCursor {
    pub(crate) fn new(iter: StoreIter, cmp: Arc<dyn Comparator>) -> PersistCursor {
        PersistCursor { iter, cmp }
    }

    fn current(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        match (self.iter.key(), self.iter.value()) {
            (Some(k), Some(v)) => Ok((k.to_vec(), v.to_vec())),
            _ => Err(Error::NotFound),
        }
    }

    fn seek(&mut self, key: &[u8], dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        self.iter.seek(key);
        let cur = self.current();
        if dir > 0 {
            return cur;
        }
        if dir < 0 {
            match cur {
                Err(_) => self.iter.seek_to_last(),
                Ok((ref k, _)) if self.cmp.compare(k, key) != Ordering::Equal => self.iter.prev(),
                ok => return ok,
            }
            return self.current();
        }
        match cur {
            Ok((k, v)) => {
                if self.cmp.compare(&k, key) == Ordering::Equal {
                    Ok((k, v))
                } else {
                    self.iter.clear();
                    Err(Error::NotFound)
                }
            }
            err => err,
        }
    }

    fn first(&mut self, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        if dir == 0 {
            return Err(Error::Invalid("direction 0 is only legal for seek"));
        }
        if dir > 0 {
            self.iter.seek_to_first();
        } else {
            self.iter.seek_to_last();
        }
        self.current()
    }

    fn next(&mut self, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        if !self.iter.valid() {
            return self.first(dir);
        }
        if dir == 0 {
            return Err(Error::Invalid("direction 0 is only legal for seek"));
        }
        if dir > 0 {
            self.iter.next();
        } else {
            self.iter.prev();
        }
        self.current()
    }

    fn clear(&mut self) {
        self.iter.clear();
    }
}

/// Ordered cursor over the union of staged and committed entries
///
/// Bound to one transaction; the staged side shadows the committed
/// side on equal keys, and every yielded key is strictly monotone in
/// the scan direction. Close or drop the cursor before ending its
/// transaction.
pub struct Cursor {
    staging: Option<SiCursor>,
    persist: PersistCursor,
    state: CursorState,
    cmp: Arc<dyn Comparator>,
    writable: bool,
}

impl Cursor {
    pub(crate) fn new(
        staging: Option<SiCursor>,
        persist: PersistCursor,
        cmp: Arc<dyn Comparator>,
        writable: bool,
    ) -> Cursor {
        Cursor {
            staging,
            persist,
            state: CursorState::Invalid,
            cmp,
            writable,
        }
    }

    /// Which side produced the current position.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Forget the current position.
    pub fn clear(&mut self) {
        if self.staging.is_none() {
            self.persist.clear();
        }
        self.state = CursorState::Invalid;
    }

    /// Position at `key`.
    ///
    /// `dir == 0` demands an exact match; `dir > 0` lands on the first
    /// key at or after `key`; `dir < 0` on the last key at or before it.
    pub fn seek(&mut self, key: &[u8], dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        let si = match &mut self.staging {
            Some(c) => si_seek(c, &self.cmp, key, dir),
            None => Err(Error::NotFound),
        };
        let ps = self.persist.seek(key, dir);
        self.merge(si, ps, dir)
    }

    /// Position at the extreme of the keyspace: smallest key for
    /// `dir > 0`, largest for `dir < 0`.
    pub fn first(&mut self, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        if dir == 0 {
            return Err(Error::Invalid("direction 0 is only legal for seek"));
        }
        let si = match &mut self.staging {
            Some(c) => c.get(None, if dir > 0 { SiOp::First } else { SiOp::Last }),
            None => Err(Error::NotFound),
        };
        let ps = self.persist.first(dir);
        self.merge(si, ps, dir)
    }

    /// Step to the neighboring key in `dir`, advancing only the
    /// side(s) that produced the current position.
    pub fn next(&mut self, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        if dir == 0 {
            return Err(Error::Invalid("direction 0 is only legal for seek"));
        }
        let si = match &mut self.staging {
            Some(c) => match self.state {
                CursorState::Pending | CursorState::Equal => {
                    c.get(None, if dir > 0 { SiOp::Next } else { SiOp::Prev })
                }
                _ => c.get(None, SiOp::GetCurrent),
            },
            None => Err(Error::NotFound),
        };
        let ps = match self.state {
            CursorState::Persist | CursorState::Equal => self.persist.next(dir),
            _ => self.persist.current(),
        };
        self.merge(si, ps, dir)
    }

    /// The entry under the cursor, staged value shadowing committed.
    pub fn current(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        match (&mut self.staging, self.state) {
            (None, _) | (_, CursorState::Persist) => self.persist.current(),
            (Some(c), CursorState::Equal | CursorState::Pending) => c.get(None, SiOp::GetCurrent),
            (_, CursorState::Invalid) => Err(Error::NotFound),
        }
    }

    /// Stage a write through the cursor.
    ///
    /// With `NOOVERWRITE`, an existing key (staged or committed) fails
    /// with `KeyExist` and leaves the cursor positioned on the existing
    /// entry, readable through [`Cursor::current`]. A successful put
    /// invalidates the merge state.
    pub fn put(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<()> {
        if !self.writable {
            return Err(Error::Access("cursor belongs to a read-only transaction"));
        }
        if flags.contains(WriteFlags::NOOVERWRITE) {
            match self.seek(key, 0) {
                Ok(_) => return Err(Error::KeyExist),
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        self.state = CursorState::Invalid;
        let staged = match &mut self.staging {
            Some(c) => c,
            None => return Err(Error::Panic("writable cursor without a staging index")),
        };
        staged.tree().lock().put(key, value)?;
        staged.set_pos(key);
        Ok(())
    }

    /// Reserved; keys cannot be deleted within a transaction yet.
    pub fn del(&mut self) -> Result<()> {
        Err(Error::Invalid("cursor delete is not supported"))
    }

    /// Position at the first entry of `range` in `dir`: the smallest
    /// in-window key for `dir > 0`, the largest for `dir < 0`.
    pub fn first_in_range(&mut self, range: &Range, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        if dir == 0 {
            return Err(Error::Invalid("direction 0 is only legal for seek"));
        }
        let (k, v) = if dir > 0 {
            self.seek(&range.min, dir)?
        } else if range.max.is_empty() {
            self.first(-1)?
        } else {
            let (k, v) = self.seek(&range.max, -1)?;
            if self.cmp.compare(&k, &range.max) == Ordering::Equal {
                // The upper bound is exclusive; step off it.
                self.next(-1)?
            } else {
                (k, v)
            }
        };
        if range.contains(self.cmp.as_ref(), &k) {
            Ok((k, v))
        } else {
            Err(Error::NotFound)
        }
    }

    /// Step within `range`; reports `NotFound` once the scan leaves
    /// the window.
    pub fn next_in_range(&mut self, range: &Range, dir: i32) -> Result<(Vec<u8>, Vec<u8>)> {
        let (k, v) = self.next(dir)?;
        if range.contains(self.cmp.as_ref(), &k) {
            Ok((k, v))
        } else {
            Err(Error::NotFound)
        }
    }

    fn merge(
        &mut self,
        si: Result<(Vec<u8>, Vec<u8>)>,
        ps: Result<(Vec<u8>, Vec<u8>)>,
        dir: i32,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        self.state = CursorState::Invalid;
        let si = match si {
            Ok(found) => Some(found),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        let ps = match ps {
            Ok(found) => Some(found),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        match (si, ps) {
            (None, None) => Err(Error::NotFound),
            (Some(staged), None) => {
                self.state = CursorState::Pending;
                Ok(staged)
            }
            (None, Some(committed)) => {
                self.state = CursorState::Persist;
                Ok(committed)
            }
            (Some(staged), Some(committed)) => {
                let mult = if dir < 0 { -1 } else { 1 };
                let x = ord_sign(self.cmp.compare(&staged.0, &committed.0)) * mult;
                match x.cmp(&0) {
                    Ordering::Equal => {
                        self.state = CursorState::Equal;
                        Ok(staged)
                    }
                    Ordering::Less => {
                        self.state = CursorState::Pending;
                        Ok(staged)
                    }
                    Ordering::Greater => {
                        self.state = CursorState::Persist;
                        Ok(committed)
                    }
                }
            }
        }
    }
}

/// Direction-aware staging seek, matching the snapshot side's shape.
fn si_seek(
    c: &mut SiCursor,
    cmp: &Arc<dyn Comparator>,
    key: &[u8],
    dir: i32,
) -> Result<(Vec<u8>, Vec<u8>)> {
    if dir == 0 {
        return c.get(Some(key), SiOp::Set);
    }
    if dir > 0 {
        return c.get(Some(key), SiOp::SetRange);
    }
    match c.get(Some(key), SiOp::SetRange) {
        Ok((k, v)) => {
            if cmp.compare(&k, key) == Ordering::Equal {
                Ok((k, v))
            } else {
                c.get(None, SiOp::Prev)
            }
        }
        Err(Error::NotFound) => c.get(None, SiOp::Last),
        Err(e) => Err(e),
    }
}

fn ord_sign(o: Ordering) -> i32 {
    match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
