//! Total order over opaque byte keys
//!
//! Every ordered structure in the store (persistent index iteration,
//! staging-index ordering, merged-cursor tie-breaks) consults the same
//! [`Comparator`] installed on the environment. The default order is
//! bytewise with key length as the final tiebreak.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A total order over byte keys
///
/// Implementations must be total, antisymmetric, transitive, and
/// deterministic: the committed key order and the staged key order are
/// merged under the assumption that both sides sorted with the same
/// function.
pub trait Comparator: Send + Sync {
    /// Compare two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// The default comparator: bytewise over the common prefix, then shorter
/// key first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalComparator;

impl Comparator for LexicalComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let min = a.len().min(b.len());
        match a[..min].cmp(&b[..min]) {
            Ordering::Equal => a.len().cmp(&b.len()),
            other => other,
        }
    }
}

/// A key bound to its comparator, usable in `BTreeMap` and friends
///
/// `Ord` delegates to the embedded comparator, so standard ordered
/// containers follow the environment's order instead of the natural
/// `[u8]` order. All `OrdKey`s in one container must share a comparator;
/// mixing comparators has no defined order.
#[derive(Clone)]
pub struct OrdKey {
    bytes: Arc<[u8]>,
    cmp: Arc<dyn Comparator>,
}

impl OrdKey {
    /// Bind `bytes` to `cmp`.
    pub fn new(bytes: &[u8], cmp: &Arc<dyn Comparator>) -> Self {
        OrdKey {
            bytes: Arc::from(bytes),
            cmp: Arc::clone(cmp),
        }
    }

    /// Bind an owned buffer to `cmp` without copying.
    pub fn from_vec(bytes: Vec<u8>, cmp: &Arc<dyn Comparator>) -> Self {
        OrdKey {
            bytes: Arc::from(bytes.into_boxed_slice()),
            cmp: Arc::clone(cmp),
        }
    }

    /// The raw key bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for OrdKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp.compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl Eq for OrdKey {}

impl PartialOrd for OrdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for OrdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrdKey({:?})", &self.bytes)
    }
}
