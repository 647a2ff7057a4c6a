//! Session-layer integration tests
//!
//! Drives the session cache the way the HTTP edge does: cookies in,
//! sessions out, users created inside caller transactions, and file
//! metadata resolved through composite-key range scans.

mod flows;
