//! Durable, ordered key-value backing store
//!
//! This crate implements the persistent side of the transactional core:
//! - `Store`: an ordered map made durable by an append-only record log
//! - `Snapshot`: an O(1) pinned point-in-time view (copy-on-write index)
//! - `StoreIter`: a bidirectional iterator over one snapshot
//! - `WriteBatch`: the unit of atomic application
//!
//! Every committed batch is one framed, checksummed, optionally
//! compressed record in `<path>/varve.log`. Opening the store replays
//! the log; a torn tail is truncated at the last valid record. Point
//! lookups pass through a bloom admission filter sized from
//! `bloom_bits_per_key`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bloom;
mod log;
pub mod options;
pub mod store;

pub use options::StoreOptions;
pub use store::{Snapshot, Store, StoreIter, WriteBatch};
