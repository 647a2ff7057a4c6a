//! Password hashing
//!
//! Passwords are stored as PHC strings and verified against them; the
//! primitive is interchangeable as long as stored hashes keep their
//! self-describing prefix. Hashing is the one CPU-heavy operation in
//! this crate and is expected to run on a worker, not the I/O loop.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use varve_core::{Error, Result};

/// Hash `password` with a fresh salt, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| Error::NoMem("password hash failed"))
}

/// Check `password` against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
