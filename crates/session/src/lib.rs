//! Sessions and the session cache
//!
//! The hottest consumer of the transactional core: maps cookies to
//! session objects, authenticates them against the store under
//! short-lived read transactions, and creates users and sessions
//! inside the caller's write transaction.
//!
//! A session key travels raw in the cookie and is stored only as its
//! SHA-256; equality checks always compare the encrypted form. An
//! anonymous caller is represented by the *absence* of a session,
//! never by a session with an empty permission mode.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cache;
pub mod schema;
pub mod session;

pub use cache::{FileInfo, SessionCache};
pub use session::{has_permission, parse_cookie, Mode, Session, SESSION_KEY_LEN};
