//! Transactions and merged cursors over the persistent store
//!
//! This crate is the transactional face of the store:
//! - `Environment`: one data directory, one comparator, one sync policy
//! - `Txn`: snapshot-isolated READ, or READ_WRITE with a staging index
//! - `Cursor`: one ordered stream over staged ∪ committed data
//!
//! A READ transaction pins a store snapshot for its whole life. A
//! READ_WRITE transaction buffers every put in an in-memory staging
//! index and drains it, in key order, into a single atomic store batch
//! at commit. Cursors under a READ_WRITE transaction merge the staging
//! index with the snapshot on the fly, with staged entries shadowing
//! committed entries of equal key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod env;
mod staging;
pub mod txn;

pub use cursor::{Cursor, CursorState, WriteFlags};
pub use env::{EnvBuilder, EnvFlags, Environment};
pub use txn::{Txn, TxnFlags};
