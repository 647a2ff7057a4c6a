//! Environment: one data directory, one keyspace
//!
//! An environment owns the persistent store handle, the staging arena
//! shared by write transactions, the comparator, and the write-sync
//! policy. It is cheap to clone and safe to share across threads; the
//! transactions themselves are not.
//!
//! The staging arena is backed by a file created under the data
//! directory and unlinked immediately after opening, so staged bytes
//! never survive the process.

use crate::staging::StagingArena;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use varve_core::{Comparator, LexicalComparator, Result};
use varve_storage::{Store, StoreOptions};

/// Name of the staging backing file inside the data directory.
pub const STAGING_FILE: &str = "tmp.varve";

/// Default permission bits for the staging backing file.
pub const DEFAULT_MODE: u32 = 0o600;

/// Fallback when the file-descriptor limit cannot be read.
const MAX_OPEN_FILES_DEFAULT: usize = 100;

bitflags::bitflags! {
    /// Environment open flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvFlags: u32 {
        /// Store writes return without waiting for durability.
        const NOSYNC = 1 << 0;
        /// Refuse write transactions.
        const RDONLY = 1 << 1;
    }
}

pub(crate) struct EnvInner {
    pub(crate) store: Store,
    pub(crate) arena: Arc<Mutex<StagingArena>>,
    pub(crate) cmp: Arc<dyn Comparator>,
    pub(crate) sync_writes: bool,
    pub(crate) read_only: bool,
    pub(crate) path: PathBuf,
}

/// Handle to one open data directory
///
/// Clones share the same underlying environment. All resources are
/// released when the last clone (and every transaction holding one)
/// is dropped; `close` exists for call sites that want the intent
/// spelled out.
#[derive(Clone)]
pub struct Environment {
    pub(crate) inner: Arc<EnvInner>,
}

impl Environment {
    /// The directory this environment was opened against.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The comparator every ordered view follows.
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.inner.cmp
    }

    /// Drop this handle. Idempotent in the sense that any number of
    /// clones may be closed independently.
    pub fn close(self) {}
}

/// Builder for [`Environment`]
///
/// Mirrors the create → configure → open lifecycle of the classic
/// key-value environments this API descends from.
pub struct EnvBuilder {
    opts: StoreOptions,
    cmp: Arc<dyn Comparator>,
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvBuilder {
    /// Start from default options and the lexical comparator.
    pub fn new() -> Self {
        EnvBuilder {
            opts: StoreOptions::default(),
            cmp: Arc::new(LexicalComparator),
        }
    }

    /// Accepted and ignored; the store sizes itself. Retained so call
    /// sites porting from map-sized environments keep their shape.
    pub fn map_size(self, _size: usize) -> Self {
        self
    }

    /// Install a custom key comparator. It replaces the default order
    /// everywhere: store iteration, staging order, and merge tie-breaks.
    pub fn comparator(mut self, cmp: Arc<dyn Comparator>) -> Self {
        self.cmp = cmp;
        self
    }

    /// Tune the bloom admission filter (bits per key; 0 disables).
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.opts.bloom_bits_per_key = bits;
        self
    }

    /// Enable or disable record compression.
    pub fn compression(mut self, on: bool) -> Self {
        self.opts.compression = on;
        self
    }

    /// Open the environment at `path`. `mode` sets the permission bits
    /// on the staging backing file.
    pub fn open(mut self, path: &Path, flags: EnvFlags, mode: u32) -> Result<Environment> {
        self.opts.max_open_files = max_open_files();
        let store = Store::open(path, self.opts, Arc::clone(&self.cmp))?;

        // The staging backing file lives in the data directory just long
        // enough to be opened, then is unlinked so the kernel reclaims
        // it when the last handle goes away.
        let staging_path = path.join(STAGING_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&staging_path)?;
        std::fs::remove_file(&staging_path)?;
        let arena = StagingArena::new(file)?;

        info!(
            path = %path.display(),
            nosync = flags.contains(EnvFlags::NOSYNC),
            rdonly = flags.contains(EnvFlags::RDONLY),
            "environment opened"
        );
        Ok(Environment {
            inner: Arc::new(EnvInner {
                store,
                arena: Arc::new(Mutex::new(arena)),
                cmp: self.cmp,
                sync_writes: !flags.contains(EnvFlags::NOSYNC),
                read_only: flags.contains(EnvFlags::RDONLY),
                path: path.to_path_buf(),
            }),
        })
    }
}

/// A third of the soft file-descriptor limit, leaving room for the
/// HTTP edge and the blob store sharing the process.
fn max_open_files() -> usize {
    let mut lim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes the out-struct and nothing else.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) };
    if rc != 0 || lim.rlim_cur == libc::RLIM_INFINITY {
        debug!("NOFILE limit unavailable, using default");
        return MAX_OPEN_FILES_DEFAULT;
    }
    (lim.rlim_cur as usize / 3).max(1)
}
