//! Core types for the Varve key-value store
//!
//! This crate defines the foundations shared by every layer:
//! - `Error`: the unified error taxonomy with stable wire codes
//! - `Comparator`: total order over opaque byte keys
//! - `codec`: length-prefixed, typed field packing for composite keys
//! - `Range`: a half-open window over encoded composite keys

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod compare;
pub mod error;
pub mod range;

pub use compare::{Comparator, LexicalComparator, OrdKey};
pub use error::{Error, Result};
pub use range::Range;
