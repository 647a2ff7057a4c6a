//! The persistent store: ordered map, snapshots, batched atomic writes
//!
//! The live index is an `Arc`-shared ordered map replaced wholesale on
//! every committed batch (copy-on-write). A snapshot is one generation
//! of that map, so taking a snapshot is O(1) and a snapshot never
//! observes later writes. Writers pay the clone; this store backs a
//! single-writer transactional layer where batches are the unit of
//! work, not individual puts.
//!
//! Durability: the record log is appended (and optionally synced)
//! before the new generation is published, so a batch is either fully
//! replayable or invisible.

use crate::bloom::Bloom;
use crate::log::Log;
use crate::options::StoreOptions;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use varve_core::{Comparator, Error, OrdKey, Result};

/// Name of the record log inside the store directory.
pub const LOG_FILE: &str = "varve.log";

type Generation = Arc<BTreeMap<OrdKey, Arc<[u8]>>>;

/// An immutable point-in-time view of the store
///
/// Cheap to take and to clone; holds one index generation alive.
#[derive(Clone)]
pub struct Snapshot {
    index: Generation,
}

impl Snapshot {
    /// Number of keys visible in this snapshot.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether this snapshot sees no keys at all.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// An ordered batch of writes applied atomically
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put. Later puts of the same key win.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.entries.push((key.to_vec(), value.to_vec()));
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Durable, ordered key-value map with snapshot reads and atomic
/// batched writes
pub struct Store {
    opts: StoreOptions,
    cmp: Arc<dyn Comparator>,
    index: RwLock<Generation>,
    log: Mutex<Log>,
    bloom: RwLock<Bloom>,
}

impl Store {
    /// Open the store at `path`, creating it when allowed, and replay
    /// the record log into memory.
    pub fn open(path: &Path, opts: StoreOptions, cmp: Arc<dyn Comparator>) -> Result<Store> {
        if !path.exists() {
            if !opts.create_if_missing {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory missing: {}", path.display()),
                )));
            }
            std::fs::create_dir_all(path)?;
        }

        let mut log = Log::open(&path.join(LOG_FILE), opts.create_if_missing)?;
        let mut index: BTreeMap<OrdKey, Arc<[u8]>> = BTreeMap::new();
        log.replay(|entries| {
            for (k, v) in entries {
                index.insert(OrdKey::from_vec(k, &cmp), Arc::from(v.into_boxed_slice()));
            }
        })?;

        let mut bloom = Bloom::with_capacity(index.len().max(64) * 2, opts.bloom_bits_per_key);
        for key in index.keys() {
            bloom.insert(key.bytes());
        }

        info!(
            path = %path.display(),
            keys = index.len(),
            max_open_files = opts.max_open_files,
            compression = opts.compression,
            "store opened"
        );
        Ok(Store {
            opts,
            cmp,
            index: RwLock::new(Arc::new(index)),
            log: Mutex::new(log),
            bloom: RwLock::new(bloom),
        })
    }

    /// The comparator this store orders by.
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.cmp
    }

    /// Pin the current generation as an immutable view.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            index: Arc::clone(&self.index.read()),
        }
    }

    /// Point lookup in a snapshot, behind the bloom admission filter.
    pub fn get(&self, snapshot: &Snapshot, key: &[u8]) -> Result<Arc<[u8]>> {
        if self.opts.bloom_bits_per_key > 0 && !self.bloom.read().maybe_contains(key) {
            return Err(Error::NotFound);
        }
        snapshot
            .index
            .get(&OrdKey::new(key, &self.cmp))
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// A bidirectional iterator over `snapshot`, initially unpositioned.
    pub fn iter(&self, snapshot: &Snapshot) -> StoreIter {
        StoreIter {
            index: Arc::clone(&snapshot.index),
            cmp: Arc::clone(&self.cmp),
            pos: None,
        }
    }

    /// Apply `batch` atomically. With `sync`, returns only once the
    /// record is durable. On failure nothing becomes visible.
    pub fn write(&self, batch: &WriteBatch, sync: bool) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // The log mutex serializes writers end-to-end so the record
        // order always matches the generation order.
        let mut log = self.log.lock();
        log.append(&batch.entries, self.opts.compression)?;
        if sync {
            log.sync()?;
        }

        // Admit new keys before publishing: a reader must never see a
        // key in its snapshot that the filter denies.
        if self.opts.bloom_bits_per_key > 0 {
            let mut bloom = self.bloom.write();
            for (k, _) in &batch.entries {
                bloom.insert(k);
            }
        }

        let mut index = self.index.write();
        let mut next = (**index).clone();
        for (k, v) in &batch.entries {
            next.insert(
                OrdKey::new(k, &self.cmp),
                Arc::from(v.clone().into_boxed_slice()),
            );
        }
        *index = Arc::new(next);
        drop(index);

        if self.opts.bloom_bits_per_key > 0 {
            self.maybe_rebuild_bloom();
        }
        debug!(writes = batch.len(), sync, "batch committed");
        Ok(())
    }

    fn maybe_rebuild_bloom(&self) {
        let needs = self.bloom.read().needs_rebuild();
        if !needs {
            return;
        }
        let index = Arc::clone(&self.index.read());
        let mut bloom = self.bloom.write();
        if !bloom.needs_rebuild() {
            return;
        }
        let mut next = Bloom::with_capacity(index.len().max(64) * 2, bloom.bits_per_key());
        for key in index.keys() {
            next.insert(key.bytes());
        }
        debug!(keys = next.count(), "bloom filter rebuilt");
        *bloom = next;
    }
}

/// Bidirectional iterator over one [`Snapshot`]
///
/// Follows the classic iterator contract: position with `seek_to_first`,
/// `seek_to_last`, or `seek`, then step with `next`/`prev` while
/// `valid`. Stepping an unpositioned iterator is a no-op; callers that
/// want wrap-around behavior build it on top.
pub struct StoreIter {
    index: Generation,
    cmp: Arc<dyn Comparator>,
    pos: Option<(OrdKey, Arc<[u8]>)>,
}

impl StoreIter {
    /// Position on the smallest key.
    pub fn seek_to_first(&mut self) {
        self.pos = self
            .index
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), Arc::clone(v)));
    }

    /// Position on the largest key.
    pub fn seek_to_last(&mut self) {
        self.pos = self
            .index
            .iter()
            .next_back()
            .map(|(k, v)| (k.clone(), Arc::clone(v)));
    }

    /// Position on the first key `>= key`, or go invalid.
    pub fn seek(&mut self, key: &[u8]) {
        let probe = OrdKey::new(key, &self.cmp);
        self.pos = self
            .index
            .range((Bound::Included(probe), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), Arc::clone(v)));
    }

    /// Step to the next key in ascending order.
    pub fn next(&mut self) {
        if let Some((cur, _)) = self.pos.take() {
            self.pos = self
                .index
                .range((Bound::Excluded(cur), Bound::Unbounded))
                .next()
                .map(|(k, v)| (k.clone(), Arc::clone(v)));
        }
    }

    /// Step to the previous key in ascending order.
    pub fn prev(&mut self) {
        if let Some((cur, _)) = self.pos.take() {
            self.pos = self
                .index
                .range((Bound::Unbounded, Bound::Excluded(cur)))
                .next_back()
                .map(|(k, v)| (k.clone(), Arc::clone(v)));
        }
    }

    /// Whether the iterator is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.pos.is_some()
    }

    /// Drop the current position.
    pub fn clear(&mut self) {
        self.pos = None;
    }

    /// Key at the current position.
    pub fn key(&self) -> Option<&[u8]> {
        self.pos.as_ref().map(|(k, _)| k.bytes())
    }

    /// Value at the current position.
    pub fn value(&self) -> Option<Arc<[u8]>> {
        self.pos.as_ref().map(|(_, v)| Arc::clone(v))
    }
}
