//! Session objects and the cookie format
//!
//! A session binds a numeric id to a user, a permission mode, and a
//! random 32-byte key. The raw key only ever appears in the cookie;
//! the store and the comparisons use its SHA-256. Key material is
//! zeroized when the last handle to a session drops.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::Arc;
use varve_core::{Error, Result};
use zeroize::Zeroize;

/// Length in bytes of both the raw and the encrypted session key.
pub const SESSION_KEY_LEN: usize = 32;
/// Length of the hex-encoded key in the cookie.
pub const SESSION_KEY_HEX: usize = SESSION_KEY_LEN * 2;

bitflags::bitflags! {
    /// Permission mode bits carried by a session
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        /// Read repository contents.
        const RDONLY = 1 << 0;
        /// Submit new contents.
        const WRONLY = 1 << 1;
        /// Administrative operations (user creation above one's mode).
        const ADMIN = 1 << 2;
        /// Read and write.
        const RDWR = Self::RDONLY.bits() | Self::WRONLY.bits();
        /// Every permission bit.
        const ROOT = Self::RDONLY.bits() | Self::WRONLY.bits() | Self::ADMIN.bits();
    }
}

/// One authenticated session
///
/// Immutable after creation; shared ownership is the retain/release
/// mechanism, and dropping the last `Arc` zeroizes the key material.
pub struct Session {
    id: u64,
    raw_key: Option<[u8; SESSION_KEY_LEN]>,
    enc_key: Option<[u8; SESSION_KEY_LEN]>,
    user_id: u64,
    mode: Mode,
    username: Option<String>,
}

impl Session {
    /// Build a session from trusted parts.
    ///
    /// A session with an empty mode cannot exist: anonymous callers
    /// are represented by *no* session. When only the raw key is
    /// given, the encrypted key is derived as its SHA-256.
    pub fn new_internal(
        id: u64,
        raw_key: Option<[u8; SESSION_KEY_LEN]>,
        enc_key: Option<[u8; SESSION_KEY_LEN]>,
        user_id: u64,
        mode: Mode,
        username: Option<String>,
    ) -> Result<Arc<Session>> {
        if mode.is_empty() {
            return Err(Error::Invalid("session mode must be non-zero"));
        }
        let enc_key = enc_key.or_else(|| raw_key.map(|raw| encrypt_key(&raw)));
        Ok(Arc::new(Session {
            id,
            raw_key,
            enc_key,
            user_id,
            mode,
            username,
        }))
    }

    /// The session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The owning user's id.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// The permission mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The username, when the session was loaded with one.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether every bit of `mask` is present in this session's mode.
    pub fn permits(&self, mask: Mode) -> bool {
        self.mode.contains(mask)
    }

    /// Compare an encrypted key against this session's stored one.
    ///
    /// Returns −1 when no encrypted key is bound; otherwise the sign
    /// of the byte comparison, 0 meaning a match.
    pub fn key_cmp(&self, enc: &[u8]) -> i32 {
        let Some(stored) = &self.enc_key else {
            return -1;
        };
        match enc.cmp(stored.as_slice()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// Format the cookie `s=<decimal id>:<lowercase hex raw key>`.
    ///
    /// Only sessions still holding their raw key (those created in
    /// this process, not loaded from the store) can produce a cookie.
    pub fn cookie(&self) -> Option<String> {
        let raw = self.raw_key.as_ref()?;
        Some(format!("s={}:{}", self.id, hex::encode(raw)))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.raw_key.zeroize();
        self.enc_key.zeroize();
    }
}

/// Whether `session` grants every bit of `mask`; an absent session
/// grants nothing.
pub fn has_permission(session: Option<&Session>, mask: Mode) -> bool {
    session.map_or(false, |s| s.permits(mask))
}

/// SHA-256 of a raw session key, the form that is stored and compared.
pub fn encrypt_key(raw: &[u8; SESSION_KEY_LEN]) -> [u8; SESSION_KEY_LEN] {
    Sha256::digest(raw).into()
}

/// Parse a cookie back into `(session id, raw key)`.
///
/// The format is strict: `s=` prefix, decimal id, one colon, exactly
/// 64 lowercase hex characters.
pub fn parse_cookie(cookie: &str) -> Result<(u64, [u8; SESSION_KEY_LEN])> {
    let rest = cookie
        .strip_prefix("s=")
        .ok_or(Error::Invalid("cookie missing session prefix"))?;
    let (id, hex_key) = rest
        .split_once(':')
        .ok_or(Error::Invalid("cookie missing key separator"))?;
    let id: u64 = id
        .parse()
        .map_err(|_| Error::Invalid("cookie session id not decimal"))?;
    if hex_key.len() != SESSION_KEY_HEX
        || !hex_key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(Error::Invalid("cookie key must be lowercase hex"));
    }
    let mut raw = [0u8; SESSION_KEY_LEN];
    hex::decode_to_slice(hex_key, &mut raw)
        .map_err(|_| Error::Invalid("cookie key must be lowercase hex"))?;
    Ok((id, raw))
}
