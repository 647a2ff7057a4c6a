//! Varve: a transactional, ordered key-value core
//!
//! The storage substrate of a content-addressed document repository:
//!
//! - [`varve_storage`]: a durable ordered map with O(1) snapshots and
//!   atomic batched writes backed by an append-only record log
//! - [`varve_txn`]: snapshot-isolated transactions and the merged
//!   cursor presenting staged ∪ committed entries as one ordered stream
//! - [`varve_session`]: the session cache the HTTP edge consumes
//! - [`varve_core`]: the error taxonomy, comparator, and field codec
//!
//! ```no_run
//! use varve::{EnvBuilder, EnvFlags, Txn, TxnFlags, WriteFlags};
//!
//! # fn main() -> varve::Result<()> {
//! let env = EnvBuilder::new().open("data".as_ref(), EnvFlags::empty(), 0o600)?;
//! let mut txn = Txn::begin(&env, None, TxnFlags::empty())?;
//! txn.put(b"greeting", b"hello", WriteFlags::empty())?;
//! txn.commit()?;
//!
//! let txn = Txn::begin(&env, None, TxnFlags::RDONLY)?;
//! assert_eq!(txn.get(b"greeting")?, b"hello");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use varve_core::{codec, Comparator, Error, LexicalComparator, OrdKey, Range, Result};
pub use varve_session::{
    has_permission, parse_cookie, FileInfo, Mode, Session, SessionCache, SESSION_KEY_LEN,
};
pub use varve_storage::{Snapshot, Store, StoreIter, StoreOptions, WriteBatch};
pub use varve_txn::{
    Cursor, CursorState, EnvBuilder, EnvFlags, Environment, Txn, TxnFlags, WriteFlags,
};
