//! Store configuration

/// Configuration for [`crate::Store`]
///
/// The defaults match the behavior the transactional layer expects:
/// create missing stores, compress large records, ten bloom bits per
/// key, and a conservative open-files hint.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the data directory and log when absent.
    pub create_if_missing: bool,
    /// Compress record payloads above the size threshold.
    pub compression: bool,
    /// Bloom admission filter density; 0 disables the filter.
    pub bloom_bits_per_key: usize,
    /// Upper bound hint for file handles this store may keep open.
    pub max_open_files: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            create_if_missing: true,
            compression: true,
            bloom_bits_per_key: 10,
            max_open_files: 100,
        }
    }
}
