//! Error types for the Varve store
//!
//! A single `Error` enum covers every layer. We use `thiserror` for the
//! `Display` and `Error` trait implementations.
//!
//! Each variant maps to a stable negative integer for the wire contract
//! (`OK` is 0 and is never an `Error`). The mapping is fixed across
//! releases; new variants may be added but existing codes never move.

use std::io;
use thiserror::Error;

/// Result type alias for Varve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire code for success. Never carried by an `Error`.
pub const CODE_OK: i32 = 0;
/// Wire code for [`Error::NotFound`].
pub const CODE_NOTFOUND: i32 = -1;
/// Wire code for [`Error::KeyExist`].
pub const CODE_KEYEXIST: i32 = -2;
/// Wire code for [`Error::Invalid`].
pub const CODE_EINVAL: i32 = -3;
/// Wire code for [`Error::Access`].
pub const CODE_EACCES: i32 = -4;
/// Wire code for [`Error::NoMem`].
pub const CODE_ENOMEM: i32 = -5;
/// Wire code for [`Error::Panic`].
pub const CODE_PANIC: i32 = -6;
/// Wire code for [`Error::Io`] and [`Error::Corruption`].
pub const CODE_IO: i32 = -7;

/// Error taxonomy for the store
///
/// Domain errors (`NotFound`, `KeyExist`) are expected and recoverable.
/// `Invalid` marks API misuse and is never retried. `Io` aborts the
/// current transaction; previously committed state is unaffected.
/// `Panic` is an invariant violation and always indicates a bug.
#[derive(Debug, Error)]
pub enum Error {
    /// Lookup missed; scans recover by continuing
    #[error("key not found")]
    NotFound,

    /// NOOVERWRITE write found an existing key
    #[error("key already exists")]
    KeyExist,

    /// API misuse: bad lengths, illegal direction, malformed input
    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    /// Permission denied, or an auto-increment id space was exhausted
    #[error("access denied: {0}")]
    Access(&'static str),

    /// Allocation or resource acquisition failed
    #[error("out of memory: {0}")]
    NoMem(&'static str),

    /// Invariant violation; the transaction is dead and this is a bug
    #[error("invariant violation: {0}")]
    Panic(&'static str),

    /// Underlying storage failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// On-disk data failed validation (bad magic, checksum mismatch)
    ///
    /// Shares the `IO` wire code but is classified distinctly so callers
    /// can tell a failing disk from a damaged log.
    #[error("corruption: {0}")]
    Corruption(String),
}

impl Error {
    /// The stable negative wire code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::NotFound => CODE_NOTFOUND,
            Error::KeyExist => CODE_KEYEXIST,
            Error::Invalid(_) => CODE_EINVAL,
            Error::Access(_) => CODE_EACCES,
            Error::NoMem(_) => CODE_ENOMEM,
            Error::Panic(_) => CODE_PANIC,
            Error::Io(_) | Error::Corruption(_) => CODE_IO,
        }
    }

    /// True for a missed lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// True for a NOOVERWRITE conflict.
    pub fn is_key_exist(&self) -> bool {
        matches!(self, Error::KeyExist)
    }

    /// True when the underlying store failed or its data is damaged.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Corruption(_))
    }
}
